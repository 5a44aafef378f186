pub mod blocks;
pub mod expr;
pub mod source;
pub mod statement;
pub mod tokenizer;
