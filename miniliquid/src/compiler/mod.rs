#![allow(missing_docs)]
//! This module contains the internals of the compiler.
pub mod ast;
pub mod lexer;
pub mod markup;
pub mod parser;
pub mod tokens;
