pub mod document;
pub mod fetcher;
pub mod session;
pub mod transport;

pub use document::{fold_variables, parse_lenient, FoldedDocument, RawDeviceDocument};
pub use fetcher::EndpointFetcher;
pub use session::{KeepaliveOutcome, Session, SessionManager};
pub use transport::{HttpResponse, HttpTransport, Transport};
