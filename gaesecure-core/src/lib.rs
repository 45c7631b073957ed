pub mod guards;
pub mod identity;
pub mod metrics;
pub mod overrides;
pub mod urlfetch;
