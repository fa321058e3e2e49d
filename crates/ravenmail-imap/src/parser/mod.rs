//! Response tokenization and parsing.

pub mod lexer;
pub mod response;
