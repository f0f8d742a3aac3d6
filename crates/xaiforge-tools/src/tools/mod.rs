pub mod calc;
pub mod file_read;
pub mod http_get;
pub mod regex_search;
pub mod repo_grep;
