//! Integration tests for the HTTP handlers
//!
//! Every test runs against the in-memory store and cache, so no database or
//! Redis instance is required.

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use telbill_api::{configure_api, json_config, AppState};
    use telbill_cache::{Cache, MemoryCache};
    use telbill_core::config::BillingConfig;

    fn state() -> web::Data<AppState> {
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        web::Data::new(AppState::in_memory(cache, &BillingConfig::default()).unwrap())
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .app_data(json_config())
                    .configure(configure_api),
            )
            .await
        };
    }

    fn start(call_id: i64, timestamp: &str) -> Value {
        json!({
            "type": "S",
            "timestamp": timestamp,
            "call_id": call_id,
            "source": "2199999999",
            "destination": "9933468278",
        })
    }

    fn end(call_id: i64, timestamp: &str) -> Value {
        json!({ "type": "E", "timestamp": timestamp, "call_id": call_id })
    }

    fn post_record(body: &Value) -> test::TestRequest {
        test::TestRequest::post().uri("/api/v1/records").set_json(body)
    }

    #[actix_web::test]
    async fn test_start_then_end_accepted() {
        let state = state();
        let app = init_app!(state);

        let resp = test::call_service(&app, post_record(&start(70, "2016-02-29T12:00:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["type"], "S");
        assert_eq!(body["data"]["source"], "2199999999");

        let resp = test::call_service(&app, post_record(&end(70, "2016-02-29T14:00:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let id = body["data"]["id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/records/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_end_with_numbers_is_bad_request() {
        let state = state();
        let app = init_app!(state);

        let mut body = start(70, "2016-02-29T12:00:00Z");
        body["type"] = json!("E");

        let resp = test::call_service(&app, post_record(&body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "structural_error");
        assert_eq!(body["status"], 400);
    }

    #[actix_web::test]
    async fn test_malformed_records_are_bad_requests() {
        let state = state();
        let app = init_app!(state);

        let mut bad_number = start(71, "2016-02-29T12:00:00Z");
        bad_number["destination"] = json!("12345");
        let missing_timestamp = json!({ "type": "S", "call_id": 72 });
        let bad_type = json!({ "type": "X", "timestamp": "2016-02-29T12:00:00Z", "call_id": 73 });

        for body in [bad_number, missing_timestamp, bad_type] {
            let resp = test::call_service(&app, post_record(&body).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", body);
        }
    }

    #[actix_web::test]
    async fn test_get_on_records_not_allowed() {
        let state = state();
        let app = init_app!(state);

        let req = test::TestRequest::get().uri("/api/v1/records").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let req = test::TestRequest::delete().uri("/api/v1/records").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[actix_web::test]
    async fn test_non_json_body_unsupported() {
        let state = state();
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/records")
            .insert_header(("content-type", "text/plain"))
            .set_payload("type=S")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[actix_web::test]
    async fn test_validation_rejections() {
        let state = state();
        let app = init_app!(state);

        let resp = test::call_service(&app, post_record(&start(70, "2016-02-29T12:00:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        // same (type, call_id)
        let resp = test::call_service(&app, post_record(&start(70, "2016-02-29T13:00:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // no Start for this call
        let resp = test::call_service(&app, post_record(&end(99, "2016-02-29T13:00:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // source still on call 70
        let resp = test::call_service(&app, post_record(&start(71, "2016-02-29T12:30:00Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], 422);
    }

    #[actix_web::test]
    async fn test_billing_rejects_bad_subscriber() {
        let state = state();
        let app = init_app!(state);

        for uri in [
            "/api/v1/billing/1234",
            "/api/v1/billing/219999999999",
            "/api/v1/billing/1234/mar-2018",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_billing_periods() {
        let state = state();
        let app = init_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/v1/billing/2199999999")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/v1/billing/2199999999/abc2017")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/v1/billing/2199999999/mar-2018")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["reference_period"], "3/2018");
        assert_eq!(body["data"]["billed_calls"], json!([]));
    }

    #[actix_web::test]
    async fn test_billing_rejects_month_at_edge_of_calendar() {
        let state = state();
        let app = init_app!(state);

        let period = chrono::NaiveDate::MAX.format("%Y-%m-01").to_string();
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/billing/2199999999/{}", period))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], 400);
    }

    #[actix_web::test]
    async fn test_statement_for_completed_call() {
        let state = state();
        let app = init_app!(state);

        // 2m47s standard then 10m56s reduced
        let resp = test::call_service(&app, post_record(&start(70, "2018-02-28T21:57:13Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = test::call_service(&app, post_record(&end(70, "2018-02-28T22:10:56Z")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get()
            .uri("/api/v1/billing/2199999999/02-2018")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let calls = body["data"]["billed_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["destination"], "9933468278");
        assert_eq!(calls[0]["call_start_date"], "2018-02-28");
        assert_eq!(calls[0]["call_start_time"], "21:57:13");
        assert_eq!(calls[0]["call_duration"], "0h13m43s");
        assert_eq!(calls[0]["charge"], "0.54");
        assert_eq!(body["data"]["total_charge"], "0.54");
    }

    #[actix_web::test]
    async fn test_tariff_lifecycle() {
        let state = state();
        let app = init_app!(state);

        let schedule = json!({
            "base_charge": "0.36",
            "standard_minute_rate": "0.09",
            "reduced_minute_rate": "0.03",
            "effective_from": "2018-01-01",
        });

        let req = test::TestRequest::post()
            .uri("/api/v1/tariffs")
            .set_json(&schedule)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let id = body["data"]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/tariffs")
            .set_json(&schedule)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let mut discounted = schedule.clone();
        discounted["effective_from"] = json!("2018-06-01");
        discounted["reduced_minute_rate"] = json!("0.10");
        let req = test::TestRequest::post()
            .uri("/api/v1/tariffs")
            .set_json(&discounted)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/v1/tariffs?page=1&per_page=10")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["reduced_minute_rate"], "0.03");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/tariffs/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/v1/tariffs/999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health() {
        let state = state();
        let app = init_app!(state);

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
    }
}
