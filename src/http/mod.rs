//! HTTP/1.1 request/response codec and session layer.

pub mod cache;
pub mod client;
pub mod headers;
pub mod mime;
pub mod request;
pub mod response;
pub mod session;
pub mod status;

pub use cache::StaticContentCache;
pub use client::HttpClient;
pub use headers::{SameSite, SetCookie};
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use session::{HttpSession, HttpSessionHandler};
