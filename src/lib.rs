//! KpiDesk - reconciliation and KPI aggregation for agents' daily
//! activity reports.
//!
//! Rows are fetched from a [`store::ReportSource`], collapsed into one
//! canonical report per agent and day by [`analysis::reconcile`], and
//! totalled into summaries, funnels and a roster for rendering by
//! [`report`].

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod store;
