//! Plaja - An online course platform backend
//!
//! This library provides accounts and sessions, course authoring with derived
//! reading lengths, the course catalog, and enrollments.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
