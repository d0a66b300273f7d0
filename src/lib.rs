// ==============================================================================
// lib.rs - ICU Subgroups Library
// ==============================================================================
// Description: Library interface for severity scoring and comorbidity
//              subgroup modules
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod aggregate;
pub mod audit;
pub mod canonicalize;
pub mod cohort;
pub mod comorbidity;
pub mod config;
pub mod error;
pub mod lca;
pub mod models;
pub mod pipeline;
pub mod profile;
pub mod scores;
pub mod store;
pub mod table;

#[cfg(test)]
mod testing;
