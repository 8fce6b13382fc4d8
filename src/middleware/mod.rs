//! HTTP instrumentation: a tower layer that observes each response and
//! records request/response metrics off the request path.

pub mod dispatch;
pub mod observer;
pub mod stats;

pub use dispatch::Dispatcher;
pub use observer::{ObservedBody, ResponseObserver};
pub use stats::{
    default_request_stat, default_response_stat, HttpStats, RequestFacts, RequestStatFn,
    ResponseStatFn, StatsLayer, StatsService,
};
