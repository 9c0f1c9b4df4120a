// Request routing for the HTTP trigger.
//
// `Router::route` maps a method, URL and optional `Authorization` header to
// a `Reply` without touching the network, so every route is unit-testable.
// `server.rs` turns replies into `tiny_http` responses.
//
// Routes (GET only):
//   /                 welcome text
//   /generate_music   start a generate job -> 202 {"job": id}
//   /train_network    start a train job -> 202 {"job": id}; needs the bearer
//                     token when one is configured
//   /jobs             every job record, oldest first
//   /jobs/<id>        one job record, or 404
// Anything else is 404.

use lofi_generator::GeneratorConfig;
use lofi_generator::jobs::{JobId, JobRunner};
use serde::Serialize;

pub const WELCOME: &str = "Welcome to the Lofi Generator! :)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::text(500, format!("failed to encode response: {e}")),
        }
    }

    fn not_found() -> Self {
        Self::text(404, "not found")
    }
}

#[derive(Serialize)]
struct Accepted {
    job: JobId,
}

pub struct Router {
    runner: JobRunner,
    config: GeneratorConfig,
    token: Option<String>,
}

impl Router {
    pub fn new(config: GeneratorConfig, token: Option<String>) -> Self {
        Self {
            runner: JobRunner::new(),
            config,
            token,
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn route(&self, method: &str, url: &str, authorization: Option<&str>) -> Reply {
        if !method.eq_ignore_ascii_case("GET") {
            return Reply::not_found();
        }
        let path = url.split(['?', '#']).next().unwrap_or_default();
        match path {
            "/" => Reply::text(200, WELCOME),
            "/generate_music" => {
                log::info!("generating music...");
                let job = self.runner.spawn_generate(self.config.clone());
                Reply::json(202, &Accepted { job })
            }
            "/train_network" => {
                if !self.authorized(authorization) {
                    log::warn!("rejected unauthorized training request");
                    return Reply::text(401, "unauthorized");
                }
                log::info!("training network...");
                let job = self.runner.spawn_train(self.config.clone());
                Reply::json(202, &Accepted { job })
            }
            "/jobs" | "/jobs/" => Reply::json(200, &self.runner.list()),
            _ => match path.strip_prefix("/jobs/").map(str::parse::<u64>) {
                Some(Ok(id)) => match self.runner.record(JobId(id)) {
                    Some(record) => Reply::json(200, &record),
                    None => Reply::not_found(),
                },
                _ => Reply::not_found(),
            },
        }
    }

    fn authorized(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|given| given.trim() == expected)
    }
}
