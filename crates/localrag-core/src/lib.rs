#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod backends;
pub mod config;
pub mod error;
pub mod lazy;
pub mod registry;
pub mod tokenize;
pub mod traits;
pub mod types;
