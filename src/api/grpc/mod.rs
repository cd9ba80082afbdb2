pub mod pb;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, TimeZone, Utc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::engine::presence::set_presence;
use crate::models::driver::Driver;
use crate::models::tracking::{Interest, TrackingEvent};
use crate::relay::directory::SubscriptionHandle;
use crate::relay::{report_location, watch_order};
use crate::state::AppState;

use pb::tracking_service_server::TrackingService;
use pb::{
    DriverResponse, ReportLocationRequest, ReportLocationResponse, SetPresenceRequest,
    WatchFleetRequest, WatchOrderRequest,
};

pub use pb::tracking_service_server::TrackingServiceServer;

pub struct GrpcTrackingService {
    state: Arc<AppState>,
}

impl GrpcTrackingService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

/// Stream of tracking events for one subscription. Dropping it (client
/// disconnect) unsubscribes.
pub struct SubscriptionStream {
    inner: ReceiverStream<TrackingEvent>,
    subscription_id: Uuid,
    state: Arc<AppState>,
}

impl SubscriptionStream {
    fn new(state: Arc<AppState>, handle: SubscriptionHandle) -> Self {
        Self {
            inner: ReceiverStream::new(handle.receiver),
            subscription_id: handle.id,
            state,
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<pb::TrackingEvent, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|event| event.map(|event| Ok(event_to_proto(&event))))
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.state.directory.unsubscribe(self.subscription_id);
    }
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw).map_err(|err| Status::invalid_argument(format!("invalid {field}: {err}")))
}

fn from_epoch_ms(ms: i64) -> Result<DateTime<Utc>, Status> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Status::invalid_argument(format!("invalid recorded_at_ms: {ms}")))
}

fn observer_or_anonymous(observer_id: String) -> String {
    if observer_id.trim().is_empty() {
        "anonymous".to_string()
    } else {
        observer_id
    }
}

fn driver_to_proto(driver: &Driver) -> DriverResponse {
    DriverResponse {
        id: driver.id.to_string(),
        display_name: driver.display_name.clone(),
        online: driver.online,
        active_order_id: driver
            .active_order
            .map(|id| id.to_string())
            .unwrap_or_default(),
    }
}

fn id_or_empty(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

pub fn event_to_proto(event: &TrackingEvent) -> pb::TrackingEvent {
    match event {
        TrackingEvent::Location {
            driver_id,
            order_id,
            lat,
            lng,
            recorded_at,
        } => pb::TrackingEvent {
            kind: "location".to_string(),
            order_id: id_or_empty(*order_id),
            driver_id: driver_id.to_string(),
            location: Some(pb::GeoPoint {
                lat: *lat,
                lng: *lng,
            }),
            status: String::new(),
            at_ms: recorded_at.timestamp_millis(),
        },
        TrackingEvent::Status {
            order_id,
            status,
            driver_id,
            at,
        } => pb::TrackingEvent {
            kind: "status".to_string(),
            order_id: order_id.to_string(),
            driver_id: id_or_empty(*driver_id),
            location: None,
            status: status.as_str().to_string(),
            at_ms: at.timestamp_millis(),
        },
        TrackingEvent::DriverUnreachable {
            order_id,
            driver_id,
            since,
        } => pb::TrackingEvent {
            kind: "driver_unreachable".to_string(),
            order_id: order_id.to_string(),
            driver_id: driver_id.to_string(),
            location: None,
            status: String::new(),
            at_ms: since.timestamp_millis(),
        },
        TrackingEvent::DriverReachable {
            order_id,
            driver_id,
            at,
        } => pb::TrackingEvent {
            kind: "driver_reachable".to_string(),
            order_id: order_id.to_string(),
            driver_id: driver_id.to_string(),
            location: None,
            status: String::new(),
            at_ms: at.timestamp_millis(),
        },
    }
}

#[tonic::async_trait]
impl TrackingService for GrpcTrackingService {
    async fn report_location(
        &self,
        request: Request<ReportLocationRequest>,
    ) -> Result<Response<ReportLocationResponse>, Status> {
        let req = request.into_inner();
        let driver_id = parse_id(&req.driver_id, "driver_id")?;
        let recorded_at = from_epoch_ms(req.recorded_at_ms)?;

        let outcome = report_location(&self.state, driver_id, req.lat, req.lng, recorded_at)?;

        Ok(Response::new(ReportLocationResponse {
            accepted: outcome.is_accepted(),
            outcome: format!("{outcome:?}").to_lowercase(),
        }))
    }

    async fn set_presence(
        &self,
        request: Request<SetPresenceRequest>,
    ) -> Result<Response<DriverResponse>, Status> {
        let req = request.into_inner();
        let driver_id = parse_id(&req.driver_id, "driver_id")?;

        let driver = set_presence(&self.state, driver_id, req.online)?;
        Ok(Response::new(driver_to_proto(&driver)))
    }

    type WatchOrderStream = SubscriptionStream;

    async fn watch_order(
        &self,
        request: Request<WatchOrderRequest>,
    ) -> Result<Response<Self::WatchOrderStream>, Status> {
        let req = request.into_inner();
        let order_id = parse_id(&req.order_id, "order_id")?;
        let handle = watch_order(
            &self.state,
            &observer_or_anonymous(req.observer_id),
            order_id,
        )?;

        Ok(Response::new(SubscriptionStream::new(
            self.state.clone(),
            handle,
        )))
    }

    type WatchFleetStream = SubscriptionStream;

    async fn watch_fleet(
        &self,
        request: Request<WatchFleetRequest>,
    ) -> Result<Response<Self::WatchFleetStream>, Status> {
        let req = request.into_inner();
        let handle = self
            .state
            .directory
            .subscribe(&observer_or_anonymous(req.observer_id), Interest::FleetWide);

        Ok(Response::new(SubscriptionStream::new(
            self.state.clone(),
            handle,
        )))
    }
}
