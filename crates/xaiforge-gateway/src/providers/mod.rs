pub mod local_http;
pub mod mock;
pub mod openai_compat;

pub use local_http::LocalHttpProvider;
pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
