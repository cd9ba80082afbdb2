//! Wire messages for `tracking.TrackingService`.
//!
//! The service stubs are generated by `build.rs`; the messages are declared
//! here with prost derives so no `.proto` toolchain is needed at build time.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportLocationRequest {
    #[prost(string, tag = "1")]
    pub driver_id: ::prost::alloc::string::String,
    #[prost(double, tag = "2")]
    pub lat: f64,
    #[prost(double, tag = "3")]
    pub lng: f64,
    /// Unix epoch milliseconds at which the sample was taken.
    #[prost(int64, tag = "4")]
    pub recorded_at_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportLocationResponse {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
    #[prost(string, tag = "2")]
    pub outcome: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetPresenceRequest {
    #[prost(string, tag = "1")]
    pub driver_id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub online: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DriverResponse {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub display_name: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub online: bool,
    #[prost(string, tag = "4")]
    pub active_order_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchOrderRequest {
    #[prost(string, tag = "1")]
    pub order_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub observer_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchFleetRequest {
    #[prost(string, tag = "1")]
    pub observer_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeoPoint {
    #[prost(double, tag = "1")]
    pub lat: f64,
    #[prost(double, tag = "2")]
    pub lng: f64,
}

/// Flattened tracking event; `kind` is one of `location`, `status`,
/// `driver_unreachable`, `driver_reachable`. Empty strings stand for absent ids.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrackingEvent {
    #[prost(string, tag = "1")]
    pub kind: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub order_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub driver_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub location: ::core::option::Option<GeoPoint>,
    #[prost(string, tag = "5")]
    pub status: ::prost::alloc::string::String,
    #[prost(int64, tag = "6")]
    pub at_ms: i64,
}

include!(concat!(env!("OUT_DIR"), "/tracking.TrackingService.rs"));
