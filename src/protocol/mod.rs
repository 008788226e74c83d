pub mod agent;
pub mod openai_chat;
