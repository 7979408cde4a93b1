//! Tree reconstruction and reconciliation over inventory exports.
//!
//! Data flows leaves first: [`source`] splits the export into raw rows,
//! [`record`] decodes them against the header, [`builder`] places each
//! record into a [`tree::Forest`] (converting fields through [`units`],
//! [`permissions`] and [`fields`]), and [`rollup`] sums and checks the
//! result.

pub mod builder;
pub mod digest;
pub mod fields;
pub mod paths;
pub mod permissions;
pub mod record;
pub mod rollup;
pub mod source;
pub mod tree;
pub mod units;
