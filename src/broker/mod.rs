//! Broker connectivity: session lifecycle, instrument master, quotes.

pub mod master;
pub mod quotes;
pub mod session;
pub mod transport;

pub use master::InstrumentMaster;
pub use quotes::QuoteClient;
pub use session::SessionManager;
pub use transport::{BrokerTransport, HttpTransport, QuoteResponse};
