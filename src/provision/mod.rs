//! One-time provisioning steps that produce files the synthesizers never
//! regenerate: a local certificate pair and the database schema.
//!
//! Both are presence-checked; an existing file is always left untouched.

pub mod schema;
pub mod selfsigned;

pub use schema::ensure_schema;
pub use selfsigned::ensure_certificate;
