pub mod assembler;
pub mod checker;
pub mod fitness;
pub mod generator;
pub mod models;
pub mod optimizer;
pub mod space;
pub mod tune;
