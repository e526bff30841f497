//! hhrun Core
//!
//! Core types shared by the hhrun batch job tooling.
//!
//! This crate contains:
//! - Domain types: job specification, remote output layout, job reports
//! - Fileset handling: selecting samples and splitting them into job shards

pub mod domain;
pub mod fileset;
