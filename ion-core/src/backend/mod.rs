pub mod lexer;
pub mod parser;
pub mod ir;
pub mod analysis;
pub mod pipeline;
pub mod error;
