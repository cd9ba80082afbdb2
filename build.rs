use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn main() {
    let tracking = Service::builder()
        .name("TrackingService")
        .package("tracking")
        .method(
            Method::builder()
                .name("report_location")
                .route_name("ReportLocation")
                .input_type("crate::api::grpc::pb::ReportLocationRequest")
                .output_type("crate::api::grpc::pb::ReportLocationResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("set_presence")
                .route_name("SetPresence")
                .input_type("crate::api::grpc::pb::SetPresenceRequest")
                .output_type("crate::api::grpc::pb::DriverResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("watch_order")
                .route_name("WatchOrder")
                .input_type("crate::api::grpc::pb::WatchOrderRequest")
                .output_type("crate::api::grpc::pb::TrackingEvent")
                .codec_path(CODEC)
                .server_streaming()
                .build(),
        )
        .method(
            Method::builder()
                .name("watch_fleet")
                .route_name("WatchFleet")
                .input_type("crate::api::grpc::pb::WatchFleetRequest")
                .output_type("crate::api::grpc::pb::TrackingEvent")
                .codec_path(CODEC)
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[tracking]);
    println!("cargo:rerun-if-changed=build.rs");
}
