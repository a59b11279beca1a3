pub mod answer;
pub mod citation;
pub mod corpus;
pub mod embeddings;
pub mod evalset;
pub mod judge;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod respond;
pub mod retrieve;
pub mod retriever_eval;
