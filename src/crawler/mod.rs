pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod rate_limit;
pub mod tokenizer;
pub mod worker;
