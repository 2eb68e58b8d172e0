//! Diploma Mailer — personalized diploma delivery from a CSV roster.

pub mod auth;
pub mod batch;
pub mod config;
pub mod diploma;
pub mod error;
pub mod mail;
pub mod roster;
pub mod web;
pub mod workspace;
