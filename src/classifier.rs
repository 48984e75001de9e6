use core::fmt;
use std::fmt::Display;
use std::time::Duration;

use flume::Receiver;
use flume::SendError;
use flume::Sender;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::inspect;
use crate::runner::ScenarioRun;
use crate::scenario::BodyCheck;
use crate::scenario::StatusSet;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("channel error")]
    ChannelError(#[from] SendError<Outcome>),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Classification {
    Pass,
    Fail,
    Skip,
}

/// The recorded result of running one scenario. Append-only from here on:
/// outcomes flow to the report sink and are never revised.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub name: String,
    pub method: String,
    pub path: String,
    pub classification: Classification,
    pub expected: StatusSet,
    pub actual: Option<StatusCode>,
    pub duration: Duration,
    pub detail: Option<String>,
}

/// Classifies one run. A pure function of the run: Skip when the
/// precondition went unmet, Fail when the request never completed or the
/// answer fell outside the expected set, Pass otherwise.
pub fn classify(run: &ScenarioRun) -> Outcome {
    let base = |classification, actual, detail| Outcome {
        name: run.name.clone(),
        method: run.method.clone(),
        path: run.path.clone(),
        classification,
        expected: run.expected.clone(),
        actual,
        duration: run.duration,
        detail,
    };

    if let Some(reason) = &run.skip_reason {
        return base(Classification::Skip, None, Some(reason.clone()));
    }

    if let Some(error) = &run.transport_error {
        return base(
            Classification::Fail,
            None,
            Some(format!("request failed: {error}")),
        );
    }

    let Some(response) = &run.response else {
        return base(
            Classification::Fail,
            None,
            Some("request produced neither response nor error".into()),
        );
    };

    if !run.expected.contains(response.status) {
        return base(
            Classification::Fail,
            Some(response.status),
            Some(inspect::error_message(&response.body_text)),
        );
    }

    // Status passed. Body contracts only bind on success answers; a 404
    // that is inside the expected set has no body to check.
    if response.status.is_success()
        && let Some(problem) = check_body(&run.body_check, response.body_json.as_ref())
    {
        return base(Classification::Fail, Some(response.status), Some(problem));
    }

    base(Classification::Pass, Some(response.status), None)
}

fn check_body(check: &BodyCheck, body_json: Option<&Value>) -> Option<String> {
    if *check == BodyCheck::None {
        return None;
    }

    let Some(document) = body_json else {
        return Some("response body is not JSON".into());
    };

    match check {
        BodyCheck::None => None,

        BodyCheck::NonEmptyArray => match document.as_array() {
            Some(items) if items.is_empty() => Some("expected a non-empty array".into()),
            Some(_) => None,
            None => Some("expected a JSON array".into()),
        },

        BodyCheck::ItemsHaveFields(fields) => {
            let Some(items) = document.as_array() else {
                return Some("expected a JSON array".into());
            };

            for (index, item) in items.iter().enumerate() {
                for field in fields {
                    if item.get(field).is_none() {
                        return Some(format!("element {index} is missing field `{field}`"));
                    }
                }
            }
            None
        }

        BodyCheck::FieldEquals { path, value } => {
            match inspect::extract_value(document, path) {
                inspect::Extracted::Present(found) if &found == value => None,
                inspect::Extracted::Present(found) => {
                    Some(format!("expected `{path}` = {value}, got {found}"))
                }
                _ => Some(format!("field `{path}` is absent from the response")),
            }
        }
    }
}

pub struct Classifier;

impl Classifier {
    pub async fn run(
        rx: Receiver<ScenarioRun>,
        tx: Sender<Outcome>,
    ) -> Result<(), ClassifierError> {
        while let Ok(run) = rx.recv_async().await {
            tx.send_async(classify(&run)).await?;
        }

        Ok(())
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let call = format!("{} {}", self.method, self.path);

        match self.classification {
            Classification::Pass => {
                let status = self
                    .actual
                    .map_or_else(|| "-".to_string(), |status| status.to_string());
                write!(
                    f,
                    "{} {name}: {call} answered {status} in {:.1?} {}",
                    console::style("✔").green().bold(),
                    self.duration,
                    console::style("PASS!").green().bold(),
                    name = self.name,
                )
            }

            Classification::Fail => match self.actual {
                Some(status) => write!(
                    f,
                    "{} {name}: {call} {}\n  Expected: {}\n  Actual:   {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                    console::style(format!("one of {}", self.expected)).green(),
                    console::style(status.to_string()).red(),
                    name = self.name,
                ),
                None => write!(
                    f,
                    "{} {name}: {call} {}\n  {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                    console::style(self.detail.as_deref().unwrap_or("request failed")).red(),
                    name = self.name,
                ),
            },

            Classification::Skip => write!(
                f,
                "{} {name}: {call} {} {}",
                console::style("↷").yellow().bold(),
                console::style("SKIPPED").yellow().bold(),
                console::style(self.detail.as_deref().unwrap_or("precondition unmet")).dim(),
                name = self.name,
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use serde_json::json;

    use super::Classification;
    use super::Classifier;
    use super::Outcome;
    use super::classify;
    use crate::runner::CapturedResponse;
    use crate::runner::ScenarioRun;
    use crate::scenario::BodyCheck;
    use crate::scenario::StatusSet;

    fn run_with(status: u16, body: &str, expected: &[u16]) -> ScenarioRun {
        ScenarioRun {
            name: "probe".into(),
            method: "GET".into(),
            path: "/orders".into(),
            expected: StatusSet::of(expected),
            body_check: BodyCheck::None,
            response: Some(CapturedResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body_text: body.to_string(),
                body_json: serde_json::from_str(body).ok(),
            }),
            transport_error: None,
            skip_reason: None,
            duration: Duration::from_millis(12),
        }
    }

    #[test]
    fn pass_iff_actual_in_expected_set() {
        assert_eq!(
            classify(&run_with(200, "[]", &[200])).classification,
            Classification::Pass
        );
        assert_eq!(
            classify(&run_with(404, "{}", &[400, 404])).classification,
            Classification::Pass
        );
        assert_eq!(
            classify(&run_with(200, "[]", &[400, 409, 422])).classification,
            Classification::Fail
        );
        assert_eq!(
            classify(&run_with(500, "{}", &[200])).classification,
            Classification::Fail
        );
    }

    #[test]
    fn failure_detail_uses_the_body_error_message() {
        let run = run_with(422, r#"{"message": "quantity exceeds stock"}"#, &[200]);

        let outcome = classify(&run);
        assert_eq!(outcome.classification, Classification::Fail);
        assert_eq!(outcome.detail.as_deref(), Some("quantity exceeds stock"));
        assert_eq!(outcome.actual, Some(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn transport_error_classifies_as_fail_with_detail() {
        let run = ScenarioRun {
            response: None,
            transport_error: Some("connection refused".into()),
            ..run_with(200, "", &[200])
        };

        let outcome = classify(&run);
        assert_eq!(outcome.classification, Classification::Fail);
        assert!(outcome.actual.is_none());
        assert_eq!(
            outcome.detail.as_deref(),
            Some("request failed: connection refused")
        );
    }

    #[test]
    fn unmet_precondition_classifies_as_skip_not_fail() {
        let run = ScenarioRun {
            response: None,
            skip_reason: Some("no record with id = 3 in /energy".into()),
            ..run_with(200, "", &[200])
        };

        let outcome = classify(&run);
        assert_eq!(outcome.classification, Classification::Skip);
        assert!(outcome.actual.is_none());
    }

    #[test]
    fn non_empty_array_check_rejects_empty_lists() {
        let mut run = run_with(200, "[]", &[200]);
        run.body_check = BodyCheck::NonEmptyArray;

        assert_eq!(classify(&run).classification, Classification::Fail);

        let mut run = run_with(200, r#"[{"id": 1}]"#, &[200]);
        run.body_check = BodyCheck::NonEmptyArray;
        assert_eq!(classify(&run).classification, Classification::Pass);
    }

    #[test]
    fn items_have_fields_check_names_the_missing_field() {
        let body = r#"[
            {"id": 1, "quantity_available": 10},
            {"id": 2}
        ]"#;
        let mut run = run_with(200, body, &[200]);
        run.body_check = BodyCheck::ItemsHaveFields(vec!["id".into(), "quantity_available".into()]);

        let outcome = classify(&run);
        assert_eq!(outcome.classification, Classification::Fail);
        assert!(
            outcome
                .detail
                .as_deref()
                .unwrap()
                .contains("quantity_available")
        );
    }

    #[test]
    fn field_equals_check_matches_the_order_id() {
        let mut run = run_with(200, r#"{"orderId": "abc-123", "fuel": "gas"}"#, &[200]);
        run.body_check = BodyCheck::FieldEquals {
            path: "orderId".into(),
            value: json!("abc-123"),
        };
        assert_eq!(classify(&run).classification, Classification::Pass);

        run.body_check = BodyCheck::FieldEquals {
            path: "orderId".into(),
            value: json!("other"),
        };
        assert_eq!(classify(&run).classification, Classification::Fail);
    }

    #[test]
    fn body_checks_do_not_bind_on_expected_error_statuses() {
        let mut run = run_with(404, r#"{"message": "not found"}"#, &[200, 404]);
        run.body_check = BodyCheck::FieldEquals {
            path: "orderId".into(),
            value: json!("abc-123"),
        };

        assert_eq!(classify(&run).classification, Classification::Pass);
    }

    #[tokio::test]
    async fn classifier_pipeline_forwards_outcomes() {
        let (runner_tx, classifier_rx) = flume::unbounded::<ScenarioRun>();
        let (classifier_tx, outputter_rx) = flume::unbounded::<Outcome>();

        tokio::spawn(async move {
            Classifier::run(classifier_rx, classifier_tx).await.unwrap();
        });

        runner_tx
            .send_async(run_with(200, r#"[{"id": 1}]"#, &[200]))
            .await
            .unwrap();
        drop(runner_tx);

        let outcome = outputter_rx.recv_async().await.unwrap();
        assert_eq!(outcome.name, "probe");
        assert_eq!(outcome.classification, Classification::Pass);
        assert_eq!(outcome.actual, Some(StatusCode::OK));
        assert!(outputter_rx.recv_async().await.is_err());
    }
}
