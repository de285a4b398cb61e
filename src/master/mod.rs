pub mod m_http_handler;
pub mod metrics;
