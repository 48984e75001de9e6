use core::fmt;
use std::collections::HashSet;
use std::fmt::Display;

use miette::Diagnostic;
use reqwest::Method;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::config::Config;
use crate::profile::ProfileKind;

/// The set of HTTP status codes a scenario accepts. The external API is
/// loosely specified, so several endpoints legitimately answer with more
/// than one code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet(Vec<StatusCode>);

impl StatusSet {
    /// Builds a set from bare status numbers.
    ///
    /// # Panics
    ///
    /// Panics on an empty slice or on a number that is not a valid HTTP
    /// status code. Both are bugs in the scenario table, not runtime
    /// conditions, and silently dropping them would leave a scenario that
    /// can never pass.
    pub fn of(codes: &[u16]) -> Self {
        assert!(!codes.is_empty(), "a scenario must expect at least one status code");

        let codes: Vec<StatusCode> = codes
            .iter()
            .map(|code| {
                StatusCode::from_u16(*code)
                    .unwrap_or_else(|_| panic!("`{code}` is not a valid status code"))
            })
            .collect();

        Self(codes)
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        self.0.contains(&status)
    }
}

impl Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(|code| code.as_u16().to_string()).collect();
        write!(f, "[{}]", codes.join(", "))
    }
}

/// A read issued before the main request to supply a dynamic parameter.
///
/// The runner fetches `path`, locates the record with `id_field == id_value`
/// in the array at `list_path`, takes the numeric `take_field`, adds
/// `offset` and substitutes the result into the main path's `placeholder`.
/// If any of that comes back absent the scenario is skipped, not failed.
#[derive(Debug, Clone)]
pub struct PreFetch {
    pub path: String,
    pub list_path: String,
    pub id_field: String,
    pub id_value: i64,
    pub take_field: String,
    pub offset: i64,
    pub placeholder: String,
}

/// A shape check applied to the response body once the status has passed.
/// Only consulted on 2xx answers; error responses have no contract body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyCheck {
    None,
    /// Body must be a JSON array with at least one element.
    NonEmptyArray,
    /// Body must be a JSON array where every element carries these fields.
    ItemsHaveFields(Vec<String>),
    /// The value at `path` must equal `value`.
    FieldEquals {
        path: String,
        value: serde_json::Value,
    },
}

/// One named request/assert unit of the suite.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub expected: StatusSet,
    pub body_check: BodyCheck,
    pub profile: ProfileKind,
    pub pre_fetch: Option<PreFetch>,
    pub depends_on: Vec<String>,
    pub idempotent_read: bool,
}

impl Scenario {
    fn read(name: &str, path: String, expected: StatusSet) -> Self {
        Self {
            name: name.to_string(),
            method: Method::GET,
            path,
            body: None,
            expected,
            body_check: BodyCheck::None,
            profile: ProfileKind::Authorized,
            pre_fetch: None,
            depends_on: vec![],
            idempotent_read: true,
        }
    }

    fn write(method: Method, name: &str, path: String, expected: StatusSet) -> Self {
        Self {
            name: name.to_string(),
            method,
            path,
            body: None,
            expected,
            body_check: BodyCheck::None,
            profile: ProfileKind::Authorized,
            pre_fetch: None,
            depends_on: vec![],
            idempotent_read: false,
        }
    }

    fn after(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|name| name.to_string()).collect();
        self
    }
}

/// The full parameterized scenario table for the Ensek API.
///
/// Mutating scenarios are wired to run after `reset` through explicit
/// dependencies; the purchase inventory is shared server-side state with no
/// transactional isolation, so order matters.
pub fn suite(config: &Config) -> Vec<Scenario> {
    let buys = ["buy_valid_fuel", "buy_second_fuel", "buy_third_fuel"];

    let mut scenarios = vec![
        Scenario::write(Method::POST, "reset", "/reset".into(), StatusSet::of(&[200])),
        Scenario::write(
            Method::PUT,
            "buy_valid_fuel",
            format!("/buy/{}/{}", config.fuel_id_valid, config.quantity_valid),
            StatusSet::of(&[200]),
        )
        .after(&["reset"]),
        Scenario::write(
            Method::PUT,
            "buy_second_fuel",
            format!("/buy/{}/5", config.fuel_id_valid + 1),
            StatusSet::of(&[200]),
        )
        .after(&["reset"]),
        Scenario::write(
            Method::PUT,
            "buy_third_fuel",
            format!("/buy/{}/8", config.fuel_id_valid + 2),
            StatusSet::of(&[200]),
        )
        .after(&["reset"]),
        Scenario {
            body_check: BodyCheck::NonEmptyArray,
            ..Scenario::read("get_orders", "/orders".into(), StatusSet::of(&[200]))
        }
        .after(&buys),
        Scenario {
            body_check: BodyCheck::ItemsHaveFields(vec![
                "id".into(),
                "quantity_available".into(),
            ]),
            ..Scenario::read("get_energy_types", "/energy".into(), StatusSet::of(&[200]))
        },
        Scenario {
            body: Some(json!({
                "username": config.username,
                "password": config.password,
            })),
            ..Scenario::write(
                Method::POST,
                "login_valid",
                "/login".into(),
                StatusSet::of(&[200, 201]),
            )
        },
        Scenario::write(
            Method::PUT,
            "buy_invalid_fuel",
            format!("/buy/{}/{}", config.fuel_id_invalid, config.quantity_invalid),
            StatusSet::of(&[400, 404, 422]),
        ),
        Scenario {
            profile: ProfileKind::InvalidToken,
            ..Scenario::read(
                "orders_unauthorized",
                "/orders".into(),
                StatusSet::of(&[401, 403]),
            )
        },
        Scenario {
            pre_fetch: Some(PreFetch {
                path: "/energy".into(),
                list_path: "$".into(),
                id_field: "id".into(),
                id_value: config.fuel_id_test,
                take_field: "quantity_available".into(),
                offset: 1,
                placeholder: "{quantity}".into(),
            }),
            ..Scenario::write(
                Method::PUT,
                "buy_exceeds_available",
                format!("/buy/{}/{{quantity}}", config.fuel_id_test),
                StatusSet::of(&[400, 409, 422]),
            )
        }
        .after(&["reset"]),
        Scenario {
            body: Some(json!({
                "username": "invaliduser",
                "password": "invalidpassword",
            })),
            ..Scenario::write(
                Method::POST,
                "login_invalid_credentials",
                "/login".into(),
                StatusSet::of(&[400, 401]),
            )
        },
        Scenario::write(
            Method::PUT,
            "buy_zero_quantity",
            format!("/buy/{}/{}", config.fuel_id_valid, config.quantity_zero),
            StatusSet::of(&[200]),
        )
        .after(&["reset"]),
        Scenario::read(
            "order_not_found",
            format!("/orders/{}", config.order_id_invalid),
            StatusSet::of(&[400, 404]),
        ),
    ];

    // Only exercised when the operator has a known-good order id on hand.
    if let Some(order_id) = &config.order_id_valid {
        scenarios.push(
            Scenario {
                body_check: BodyCheck::FieldEquals {
                    path: "orderId".into(),
                    value: json!(order_id),
                },
                ..Scenario::read(
                    "get_order_by_id",
                    format!("/orders/{order_id}"),
                    StatusSet::of(&[200, 404]),
                )
            }
            .after(&buys),
        );
    }

    scenarios
}

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("Scenario `{scenario}` depends on unknown scenario `{dependency}`")]
    UnknownDependency { scenario: String, dependency: String },

    #[error("Dependency cycle involving scenario `{scenario}`")]
    Cycle { scenario: String },

    #[error("Duplicate scenario name `{name}`")]
    DuplicateName { name: String },
}

/// Orders scenarios so that every dependency runs before its dependents,
/// keeping declaration order among scenarios whose dependencies are already
/// satisfied. Unknown names and cycles are configuration errors.
pub fn plan(scenarios: Vec<Scenario>) -> Result<Vec<Scenario>, PlanError> {
    let mut names = HashSet::new();
    for scenario in &scenarios {
        if !names.insert(scenario.name.clone()) {
            return Err(PlanError::DuplicateName {
                name: scenario.name.clone(),
            });
        }
    }

    for scenario in &scenarios {
        for dependency in &scenario.depends_on {
            if !names.contains(dependency) {
                return Err(PlanError::UnknownDependency {
                    scenario: scenario.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut remaining = scenarios;
    let mut ordered: Vec<Scenario> = Vec::with_capacity(remaining.len());
    let mut scheduled: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let position = remaining.iter().position(|scenario| {
            scenario
                .depends_on
                .iter()
                .all(|dependency| scheduled.contains(dependency))
        });

        let Some(position) = position else {
            return Err(PlanError::Cycle {
                scenario: remaining[0].name.clone(),
            });
        };

        let scenario = remaining.remove(position);
        scheduled.insert(scenario.name.clone());
        ordered.push(scenario);
    }

    Ok(ordered)
}
