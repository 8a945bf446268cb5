// src/models/mod.rs

pub mod approval;
pub mod ledger;
pub mod organized_post;
pub mod post;
pub mod rate_card;
pub mod sponsor;
pub mod user;
