#![allow(
    clippy::unwrap_used,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]

//! Dispatch tests: headers and bodies on the wire, the single retry after `401 Unauthorized`,
//! error mapping and the endpoint wrappers.

mod common;

use httpmock::Method::{DELETE, GET, POST};
use httpmock::MockServer;
use reqwest::{Method, StatusCode};
use samplify_client_sdk::auth::Credentials;
use samplify_client_sdk::client::{Endpoints, Upload};
use samplify_client_sdk::error::{Kind, Status};
use samplify_client_sdk::query::{Filter, QueryField, QueryOptions};
use samplify_client_sdk::quota::{
    QuotaCell, QuotaGroup, QuotaPlan, TargetingAttribute, TemplateCriteria,
};
use samplify_client_sdk::{Client, Config};
use serde::Deserialize;
use serde_json::json;

use crate::common::{
    CLIENT_ID, PASSWORD, USERNAME, bearer, create_client, mock_password_grant,
    mock_rejected_password_grant, valid_pair,
};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Project {
    ext_project_id: String,
    title: String,
}

mod retry {
    use super::*;

    #[tokio::test]
    async fn unauthorized_should_reacquire_and_retry_once() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("stale")).await;

        let rejected = server.mock(|when, then| {
            when.method(GET)
                .path("/sample/v1/projects/p-1")
                .header("authorization", bearer("stale"));
            then.status(StatusCode::UNAUTHORIZED)
                .json_body(json!({ "message": "token revoked" }));
        });
        let grant = mock_password_grant(&server, "fresh");
        let accepted = server.mock(|when, then| {
            when.method(GET)
                .path("/sample/v1/projects/p-1")
                .header("authorization", bearer("fresh"));
            then.status(StatusCode::OK)
                .json_body(json!({ "extProjectId": "p-1", "title": "Samplify Client Test" }));
        });

        let project: Project = client
            .request_json::<_, ()>(Method::GET, &client.endpoints().api, "/projects/p-1", None)
            .await?;

        assert_eq!(
            project,
            Project {
                ext_project_id: "p-1".to_owned(),
                title: "Samplify Client Test".to_owned(),
            }
        );
        rejected.assert();
        grant.assert();
        accepted.assert();

        Ok(())
    }

    #[tokio::test]
    async fn persistent_unauthorized_should_stop_after_second_attempt() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("stale")).await;

        let grant = mock_password_grant(&server, "fresh");
        let projects = server.mock(|when, then| {
            when.method(GET).path("/sample/v1/projects");
            then.status(StatusCode::UNAUTHORIZED)
                .json_body(json!({ "message": "forbidden company" }));
        });

        let err = client
            .projects(&QueryOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Status);
        assert_eq!(err.status_code(), Some(StatusCode::UNAUTHORIZED));
        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.body, r#"{"message":"forbidden company"}"#);

        projects.assert_calls(2);
        grant.assert_calls(1);

        Ok(())
    }

    #[tokio::test]
    async fn failed_reacquire_should_not_retry() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("stale")).await;

        let grant = mock_rejected_password_grant(&server);
        let projects = server.mock(|when, then| {
            when.method(GET).path("/sample/v1/projects");
            then.status(StatusCode::UNAUTHORIZED);
        });

        let err = client
            .projects(&QueryOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Authentication);
        projects.assert_calls(1);
        grant.assert();

        Ok(())
    }

    #[tokio::test]
    async fn other_statuses_should_not_retry() -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct ApiStatus {
            status: ApiStatusMessage,
        }

        #[derive(Deserialize)]
        struct ApiStatusMessage {
            message: String,
        }

        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let grant = mock_password_grant(&server, "fresh");
        let projects = server.mock(|when, then| {
            when.method(GET).path("/sample/v1/projects/missing");
            then.status(StatusCode::NOT_FOUND)
                .header("x-request-id", "req-404")
                .json_body(json!({ "status": { "message": "not found" } }));
        });

        let err = client
            .request::<()>(
                Method::GET,
                &client.endpoints().api,
                "/projects/missing",
                None,
            )
            .await
            .unwrap_err();

        projects.assert_calls(1);
        grant.assert_calls(0);

        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.status_code, StatusCode::NOT_FOUND);
        assert_eq!(status.method, Method::GET);
        assert_eq!(status.request_id.as_deref(), Some("req-404"));

        let envelope = status.error_response();
        let path = format!("{}/sample/v1/projects/missing", server.base_url());
        assert_eq!(envelope.http_code, 404);
        assert_eq!(envelope.http_phrase, "404 Not Found");
        assert_eq!(envelope.request_id, "req-404");
        assert_eq!(envelope.path, path);
        assert_eq!(envelope.errors.len(), 1);
        assert_eq!(envelope.errors[0].path, path);
        assert_eq!(envelope.errors[0].message, "404 Not Found");

        let api_status: ApiStatus = status.decode_body()?;
        assert_eq!(api_status.status.message, "not found");

        Ok(())
    }

    #[tokio::test]
    async fn upload_should_retry_with_rebuilt_form() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("stale")).await;

        let rejected = server.mock(|when, then| {
            when.method(POST)
                .path("/sample/v1/projects/p-1/reconcile")
                .header("authorization", bearer("stale"));
            then.status(StatusCode::UNAUTHORIZED);
        });
        let grant = mock_password_grant(&server, "fresh");
        let accepted = server.mock(|when, then| {
            when.method(POST)
                .path("/sample/v1/projects/p-1/reconcile")
                .header("authorization", bearer("fresh"))
                .body_includes(r#"name="file"; filename="ids.csv""#)
                .body_includes("respondent-1\nrespondent-2")
                .body_includes(r#"name="message""#)
                .body_includes("reconcile march");
            then.status(StatusCode::OK)
                .json_body(json!({ "status": { "message": "success" } }));
        });

        let upload = Upload::new(
            "ids.csv",
            b"respondent-1\nrespondent-2".to_vec(),
            "reconcile march",
        );
        client.upload_reconcile("p-1", upload).await?;

        rejected.assert();
        grant.assert();
        accepted.assert();

        Ok(())
    }
}

mod wire {
    use super::*;

    #[tokio::test]
    async fn absent_body_should_be_sent_as_null() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/sample/v1/templates/quotaPlan/7")
                .header("content-type", "application/json")
                .body("null");
            then.status(StatusCode::OK).json_body(json!({}));
        });

        client.delete_template(7).await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn request_id_should_be_returned() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        server.mock(|when, then| {
            when.method(GET).path("/sample/v1/events");
            then.status(StatusCode::OK)
                .header("x-request-id", "req-1")
                .json_body(json!({ "data": [] }));
        });

        let response = client.events(&QueryOptions::default()).await?;

        assert_eq!(response.request_id.as_deref(), Some("req-1"));

        Ok(())
    }

    #[tokio::test]
    async fn projects_should_send_clamped_query() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/sample/v1/projects")
                .query_param("title", "Samplify Client Test")
                .query_param("limit", "1000");
            then.status(StatusCode::OK).json_body(json!({ "data": [] }));
        });

        let options = QueryOptions::builder()
            .filters(vec![Filter::new(QueryField::Title, "Samplify Client Test")])
            .limit(5000)
            .build();
        client.projects(&options).await?;

        mock.assert();
        assert_eq!(options.limit, 5000, "options must not be modified");

        Ok(())
    }

    #[tokio::test]
    async fn line_items_should_target_project() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/sample/v1/projects/p-1/lineItems")
                .query_param("offset", "20");
            then.status(StatusCode::OK).json_body(json!({ "data": [] }));
        });

        let options = QueryOptions::builder().offset(20).build();
        client.line_items("p-1", &options).await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn project_id_should_stay_in_its_path_segment() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path_matches(r"^/sample/v1/projects/[^/]+/lineItems$")
                .query_param("limit", "5");
            then.status(StatusCode::OK).json_body(json!({ "data": [] }));
        });

        let options = QueryOptions::builder().limit(5).build();
        client.line_items("p-1?x=1", &options).await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn health_status_should_hit_gateway() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/status/gateway")
                .header("authorization", bearer("current"));
            then.status(StatusCode::OK).json_body(json!({ "status": "UP" }));
        });

        let response = client.health_status().await?;

        mock.assert();
        assert_eq!(response.body, r#"{"status":"UP"}"#);

        Ok(())
    }

    #[tokio::test]
    async fn undecodable_success_should_be_decode() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        server.mock(|when, then| {
            when.method(GET).path("/sample/v1/projects/p-1");
            then.status(StatusCode::OK)
                .json_body(json!({ "extProjectId": 1 }));
        });

        let err = client
            .request_json::<Project, ()>(
                Method::GET,
                &client.endpoints().api,
                "/projects/p-1",
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Decode);

        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_should_be_transport() -> anyhow::Result<()> {
        let config = Config::builder()
            .endpoints(Endpoints::from_base("http://127.0.0.1:9")?)
            .build();
        let client = Client::new(
            Credentials::new(CLIENT_ID, USERNAME, PASSWORD.to_owned()),
            config,
        )?;
        client.restore_tokens(valid_pair("current")).await;

        let err = client
            .events(&QueryOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Kind::Transport);

        Ok(())
    }
}

mod validation {
    use super::*;

    fn mixed_plan() -> QuotaPlan {
        let nodes = vec![TargetingAttribute::new("11", vec!["1".to_owned()])];

        QuotaPlan::new(
            vec![],
            vec![QuotaGroup::new(
                Some("Gender".to_owned()),
                vec![
                    QuotaCell::percentage(nodes.clone(), 50.0),
                    QuotaCell::count(nodes, 100),
                ],
            )],
        )
    }

    #[tokio::test]
    async fn invalid_template_should_not_be_sent() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;

        let grant = mock_password_grant(&server, "fresh");
        let create = server.mock(|when, then| {
            when.method(POST).path("/sample/v1/templates/quotaPlan");
            then.status(StatusCode::CREATED).json_body(json!({}));
        });

        let template =
            TemplateCriteria::new("Gen pop", "d", "US", "en").with_quota_plan(mixed_plan());
        let err = client.create_template(&template).await.unwrap_err();

        assert_eq!(err.kind(), Kind::Validation);
        create.assert_calls(0);
        grant.assert_calls(0);

        Ok(())
    }

    #[tokio::test]
    async fn valid_template_should_be_sent() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;
        client.restore_tokens(valid_pair("current")).await;

        let nodes = vec![TargetingAttribute::new("11", vec!["1".to_owned()])];
        let plan = QuotaPlan::new(
            vec![],
            vec![QuotaGroup::new(
                None,
                vec![
                    QuotaCell::percentage(nodes.clone(), 40.0),
                    QuotaCell::percentage(nodes, 60.0),
                ],
            )],
        );
        let template = TemplateCriteria::new("Gen pop", "d", "US", "en").with_quota_plan(plan);

        let update = server.mock(|when, then| {
            when.method(POST)
                .path("/sample/v1/templates/quotaPlan/12")
                .body_includes(r#""name":"Gen pop""#)
                .body_includes(r#""perc":40.0"#);
            then.status(StatusCode::OK).json_body(json!({ "id": 12 }));
        });

        client.update_template(12, &template).await?;

        update.assert();

        Ok(())
    }

    #[tokio::test]
    async fn blank_project_id_should_not_be_sent() -> anyhow::Result<()> {
        let server = MockServer::start();
        let client = create_client(&server)?;

        let grant = mock_password_grant(&server, "fresh");

        let err = client
            .line_items("", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);

        let err = client
            .upload_reconcile(" ", Upload::new("ids.csv", vec![], "m"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);

        grant.assert_calls(0);

        Ok(())
    }
}
