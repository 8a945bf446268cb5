// src/utils/mod.rs

pub mod files;
pub mod html;
pub mod jwt;
