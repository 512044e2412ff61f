use log::{error, info, warn};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use warp::filters::body::BodyDeserializeError;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType};
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use crate::config::Config;
use crate::error::{ApiError, StoreAction};
use crate::store::RecordStore;
use crate::types::{Created, ErrorBody, VehicleRecord};
use crate::validation;

pub async fn run(config: Config, store: RecordStore) -> Result<(), warp::Error> {
    let routes = routes(Arc::new(store), &config);
    let (addr, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(config.addr(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })?;
    info!("Vehicle data API listening at http://{}", addr);
    info!("POST endpoint: {}", endpoint(&config.route_prefix, "/vehicle-data"));
    info!("GET endpoint: {}", endpoint(&config.route_prefix, "/vehicle-data/:id"));
    server.await;
    Ok(())
}

fn endpoint(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{} (also /{}{})", path, prefix, path)
    }
}

/// All routes, served at the bare path and again under `config.route_prefix`.
pub fn routes(
    store: Arc<RecordStore>,
    config: &Config,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = vehicle_data(store, config.body_limit);
    let mounted = if config.route_prefix.is_empty() {
        api
    } else {
        api.clone()
            .or(prefix(&config.route_prefix).and(api))
            .unify()
            .boxed()
    };
    mounted.recover(handle_rejection)
}

fn prefix(prefix: &str) -> BoxedFilter<()> {
    prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.to_string())).boxed()
        })
}

fn vehicle_data(store: Arc<RecordStore>, body_limit: u64) -> BoxedFilter<(Response,)> {
    let create = warp::post()
        .and(warp::path::end())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and_then(create_record);
    let read = warp::get()
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_store(store))
        .and_then(read_record);
    warp::path("vehicle-data")
        .and(create.or(read).unify())
        .boxed()
}

fn with_store(
    store: Arc<RecordStore>,
) -> impl Filter<Extract = (Arc<RecordStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

async fn create_record(data: Value, store: Arc<RecordStore>) -> Result<Response, Infallible> {
    Ok(match create(data, &store) {
        Ok(id) => reply::with_status(
            reply::json(&Created {
                message: "Vehicle data successfully recorded",
                id,
            }),
            StatusCode::CREATED,
        )
        .into_response(),
        Err(e) => error_response(&e),
    })
}

fn create(data: Value, store: &RecordStore) -> Result<String, ApiError> {
    if let Err(missing) = validation::validate(&data) {
        warn!(event = "VALIDATION_FAILED", missing = missing.len(); "Rejected vehicle data: missing {}", missing.join(", "));
        return Err(ApiError::MissingFields(missing));
    }

    let record = VehicleRecord::new(data);
    if let Err(e) = store.put(&record.id, &record) {
        let cause = e.to_string();
        error!(event = "RECORD_STORE_FAILED", id = record.id.as_str(), error = cause.as_str(); "Failed to store vehicle record");
        return Err(ApiError::Store {
            action: StoreAction::Storing,
            source: e,
        });
    }

    let crossing = match &record.data["crossingIndexCode"] {
        Value::String(code) => code.clone(),
        other => other.to_string(),
    };
    info!(event = "RECORD_CREATED", id = record.id.as_str(), crossingIndexCode = crossing.as_str(); "New vehicle record successfully added");
    Ok(record.id)
}

async fn read_record(id: String, store: Arc<RecordStore>) -> Result<Response, Infallible> {
    Ok(match read(id, &store) {
        Ok(data) => reply::json(&data).into_response(),
        Err(e) => error_response(&e),
    })
}

fn read(id: String, store: &RecordStore) -> Result<Value, ApiError> {
    match store.get(&id) {
        Ok(Some(record)) => {
            info!(event = "RECORD_RETRIEVED", id = id.as_str(); "Vehicle record retrieved");
            Ok(record.data)
        }
        Ok(None) => {
            warn!(event = "RECORD_NOT_FOUND", id = id.as_str(); "No vehicle record with this id");
            Err(ApiError::NotFound(id))
        }
        Err(e) => {
            let cause = e.to_string();
            error!(event = "RECORD_FETCH_FAILED", id = id.as_str(), error = cause.as_str(); "Failed to retrieve vehicle record");
            Err(ApiError::Store {
                action: StoreAction::Retrieving,
                source: e,
            })
        }
    }
}

fn error_response(e: &ApiError) -> Response {
    reply::with_status(reply::json(&e.body()), e.status()).into_response()
}

/// Turns warp's own rejections (bad body, unknown route, ...) into error envelopes.
async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, body) = if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ErrorBody::message("Not Found", "No such endpoint."),
        )
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            ErrorBody::message("Invalid Data", e.to_string()),
        )
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorBody::message("Payload Too Large", "Request body exceeds the size limit."),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            ErrorBody::message("Length Required", "A Content-Length header is required."),
        )
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorBody::message("Unsupported Media Type", "Request body must be JSON."),
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorBody::message("Method Not Allowed", "Method not allowed for this endpoint."),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::details("Internal Server Error", "Unhandled request rejection."),
        )
    };
    let code = u64::from(status.as_u16());
    warn!(event = "REQUEST_REJECTED", status = code; "{}", body.error);
    Ok(reply::with_status(reply::json(&body), status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::BlobStore;
    use crate::validation::{sample_payload, CROSSING_FIELDS};
    use serde_json::json;

    fn api(store: RecordStore) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        routes(Arc::new(store), &Config::default())
    }

    fn json_of(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    async fn post<F>(filter: &F, path: &str, body: &Value) -> (StatusCode, Value)
    where
        F: Filter + 'static,
        F::Extract: Reply + Send,
    {
        let res = warp::test::request()
            .method("POST")
            .path(path)
            .json(body)
            .reply(filter)
            .await;
        (res.status(), json_of(res.body()))
    }

    async fn get<F>(filter: &F, path: &str) -> (StatusCode, Value)
    where
        F: Filter + 'static,
        F::Extract: Reply + Send,
    {
        let res = warp::test::request().path(path).reply(filter).await;
        (res.status(), json_of(res.body()))
    }

    struct FailingBlobs;

    impl BlobStore for FailingBlobs {
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn post_then_get_returns_payload() {
        let filter = api(RecordStore::in_memory());
        let (status, created) = post(&filter, "/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["message"], "Vehicle data successfully recorded");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, data) = get(&filter, &format!("/vehicle-data/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data, sample_payload());
    }

    #[tokio::test]
    async fn prefixed_and_bare_routes_share_the_store() {
        let filter = api(RecordStore::in_memory());
        let (status, created) = post(&filter, "/api/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap();

        let (status, data) = get(&filter, &format!("/vehicle-data/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data, sample_payload());
    }

    #[tokio::test]
    async fn multi_segment_prefix() {
        let config = Config {
            route_prefix: ".netlify/functions/api".to_string(),
            ..Config::default()
        };
        let filter = routes(Arc::new(RecordStore::in_memory()), &config);
        let (status, _) = post(
            &filter,
            "/.netlify/functions/api/vehicle-data",
            &sample_payload(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = post(&filter, "/api/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ids_are_fresh_per_post() {
        let filter = api(RecordStore::in_memory());
        let (_, first) = post(&filter, "/vehicle-data", &sample_payload()).await;
        let (_, second) = post(&filter, "/vehicle-data", &sample_payload()).await;
        assert_ne!(first["id"], second["id"]);
    }

    #[tokio::test]
    async fn client_supplied_id_is_not_used() {
        let filter = api(RecordStore::in_memory());
        let mut payload = sample_payload();
        payload["id"] = json!("client-chosen");
        let (status, created) = post(&filter, "/vehicle-data", &payload).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(created["id"], "client-chosen");

        let (status, _) = get(&filter, "/vehicle-data/client-chosen").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let filter = api(RecordStore::in_memory());
        let (status, body) = get(&filter, "/vehicle-data/never-issued").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({"error": "Not Found", "message": "Record with ID never-issued not found."})
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_in_sqlite() {
        let blobs = crate::db::SqliteBlobStore::open_in_memory("vehicle_data_store").unwrap();
        let filter = api(RecordStore::new(Arc::new(blobs)));
        let (status, _) = get(&filter, "/vehicle-data/never-issued").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, created) = post(&filter, "/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, data) = get(
            &filter,
            &format!("/vehicle-data/{}", created["id"].as_str().unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data, sample_payload());
    }

    #[tokio::test]
    async fn missing_fields_are_listed() {
        let filter = api(RecordStore::in_memory());
        let mut payload = sample_payload();
        let map = payload.as_object_mut().unwrap();
        map.remove("lane");
        map.remove("datetime");

        let (status, body) = post(&filter, "/vehicle-data", &payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": "Invalid Data", "message": "Missing required fields: datetime, lane"})
        );
    }

    #[tokio::test]
    async fn empty_object_is_missing_every_field() {
        let filter = api(RecordStore::in_memory());
        let (status, body) = post(&filter, "/vehicle-data", &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let expected = format!("Missing required fields: {}", CROSSING_FIELDS.join(", "));
        assert_eq!(body["message"], expected.as_str());
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let filter = api(RecordStore::in_memory());
        let res = warp::test::request()
            .method("POST")
            .path("/vehicle-data")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(res.body())["error"], "Invalid Data");
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let config = Config {
            body_limit: 64,
            ..Config::default()
        };
        let filter = routes(Arc::new(RecordStore::in_memory()), &config);
        let (status, body) = post(&filter, "/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "Payload Too Large");
    }

    #[tokio::test]
    async fn large_image_payload_is_accepted() {
        let filter = api(RecordStore::in_memory());
        let mut payload = sample_payload();
        payload["overview_image"] = json!("A".repeat(2 * 1024 * 1024));
        let (status, created) = post(&filter, "/vehicle-data", &payload).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, data) = get(
            &filter,
            &format!("/vehicle-data/{}", created["id"].as_str().unwrap()),
        )
        .await;
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn store_failure_on_create_is_internal_error() {
        let filter = api(RecordStore::new(Arc::new(FailingBlobs)));
        let (status, body) = post(&filter, "/vehicle-data", &sample_payload()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({
                "error": "Internal Server Error",
                "details": "Failed to store data in the record store."
            })
        );
    }

    #[tokio::test]
    async fn store_failure_on_read_is_internal_error() {
        let filter = api(RecordStore::new(Arc::new(FailingBlobs)));
        let (status, body) = get(&filter, "/vehicle-data/anything").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .starts_with("Failed to retrieve data from the record store."));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let filter = api(RecordStore::in_memory());
        let (status, body) = get(&filter, "/plates").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let filter = api(RecordStore::in_memory());
        let res = warp::test::request()
            .method("DELETE")
            .path("/vehicle-data/abc")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
