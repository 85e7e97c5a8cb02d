//! Room booking scenario against the simulated site
//!
//! Plan: log in, open the booking form, then one booking step per room.

use crate::site::{
    BookingSite, CheckContentTool, ClickTool, FillSecretTool, FillTool, NavigateTool,
    ACCOUNT_MARKER, DEMO_PASSWORD, DEMO_USER, LOGIN_MARKER, LOGIN_URL, ROOMS_MARKER, ROOMS_URL,
};
use async_trait::async_trait;
use chrono::{Datelike, Duration as Days, Local, NaiveDate, Weekday};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::{
    ParsedParams, Plan, Scenario, ScenarioContext, ScenarioError, Step, StepFault, StepState,
};
use stepwise_escalation::{CallHumanTool, EscalationBroker, DEFAULT_HUMAN_TIMEOUT};
use stepwise_tools::{RegistryError, ToolParams, ToolRegistry};

/// Rooms booked when the command names none
pub const PREFERRED_ROOMS: &[&str] = &["101"];

/// Date format accepted in commands and typed into the form
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn args(value: Value) -> ToolParams {
    match value {
        Value::Object(map) => map,
        _ => ToolParams::new(),
    }
}

/// Invoke one tool and report whether it succeeded
async fn act(
    state: &mut StepState<BookingSite>,
    env: &mut BookingSite,
    tool: &str,
    params: Value,
    header: &str,
) -> Result<bool, StepFault> {
    let response = state.invoke(tool, &args(params), env, Some(header)).await?;
    if !response.success {
        tracing::warn!(tool, error = response.error.as_deref().unwrap_or_default(), "{header} failed");
    }
    Ok(response.success)
}

/// The same tool set for every step
///
/// # Errors
/// `RegistryError` if a built-in tool spec is malformed
pub fn site_tools(
    broker: Arc<dyn EscalationBroker>,
    human_timeout: Duration,
) -> Result<ToolRegistry<BookingSite>, RegistryError> {
    ToolRegistry::new()
        .with_tool("NavigateTool", Arc::new(NavigateTool))?
        .with_tool("CheckContentTool", Arc::new(CheckContentTool))?
        .with_tool("FillTool", Arc::new(FillTool))?
        .with_tool("FillSecretTool", Arc::new(FillSecretTool))?
        .with_tool("ClickTool", Arc::new(ClickTool))?
        .with_tool(
            "CallHumanTool",
            Arc::new(CallHumanTool::new(broker).with_timeout(human_timeout)),
        )
}

/// Authenticate with the demo account
#[derive(Debug)]
pub struct LoginStep {
    state: StepState<BookingSite>,
}

impl LoginStep {
    /// Create step
    #[must_use]
    pub fn new(tools: ToolRegistry<BookingSite>) -> Self {
        Self {
            state: StepState::new(tools),
        }
    }
}

#[async_trait]
impl Step<BookingSite> for LoginStep {
    fn name(&self) -> &str {
        "login"
    }

    fn description(&self) -> String {
        "Log in to the booking system".to_string()
    }

    fn state(&self) -> &StepState<BookingSite> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState<BookingSite> {
        &mut self.state
    }

    async fn execute(&mut self, ctx: &ScenarioContext, env: &mut BookingSite) -> Result<bool, StepFault> {
        let state = &mut self.state;
        let ok = act(state, env, "NavigateTool", json!({"url": LOGIN_URL}), "Navigating to login page").await?
            && act(state, env, "CheckContentTool", json!({"texts": [LOGIN_MARKER]}), "Checking login page").await?
            && act(state, env, "FillTool", json!({"selector": "#username", "value": DEMO_USER}), "Filling username field").await?
            && act(state, env, "FillSecretTool", json!({"selector": "#password", "value": DEMO_PASSWORD}), "Filling password field").await?
            && act(state, env, "ClickTool", json!({"selector": "#login"}), "Submitting login form").await?;
        if !ok {
            return Ok(false);
        }
        self.verify_success(ctx, env).await
    }

    async fn verify_success(&self, _ctx: &ScenarioContext, env: &BookingSite) -> Result<bool, StepFault> {
        Ok(env.session().is_some())
    }
}

/// Open the room booking form
#[derive(Debug)]
pub struct NavigateStep {
    state: StepState<BookingSite>,
}

impl NavigateStep {
    /// Create step
    #[must_use]
    pub fn new(tools: ToolRegistry<BookingSite>) -> Self {
        Self {
            state: StepState::new(tools),
        }
    }
}

#[async_trait]
impl Step<BookingSite> for NavigateStep {
    fn name(&self) -> &str {
        "navigate"
    }

    fn description(&self) -> String {
        "Open the room booking form".to_string()
    }

    fn state(&self) -> &StepState<BookingSite> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState<BookingSite> {
        &mut self.state
    }

    async fn execute(&mut self, ctx: &ScenarioContext, env: &mut BookingSite) -> Result<bool, StepFault> {
        let state = &mut self.state;
        let ok = act(state, env, "NavigateTool", json!({"url": ROOMS_URL}), "Navigating to booking form").await?
            && act(state, env, "CheckContentTool", json!({"texts": [ROOMS_MARKER]}), "Checking booking form").await?;
        if !ok {
            return Ok(false);
        }
        self.verify_success(ctx, env).await
    }

    async fn verify_success(&self, _ctx: &ScenarioContext, env: &BookingSite) -> Result<bool, StepFault> {
        let page = env.page_text();
        Ok(page.contains(ROOMS_MARKER) && !page.contains(ACCOUNT_MARKER))
    }
}

/// Book one room on the requested date
#[derive(Debug)]
pub struct RoomBookingStep {
    name: String,
    room: String,
    date: String,
    state: StepState<BookingSite>,
}

impl RoomBookingStep {
    /// Create step for `room` on `date`
    #[must_use]
    pub fn new(room: &str, date: &str, tools: ToolRegistry<BookingSite>) -> Self {
        Self {
            name: format!("book_room_{room}"),
            room: room.to_string(),
            date: date.to_string(),
            state: StepState::new(tools),
        }
    }
}

#[async_trait]
impl Step<BookingSite> for RoomBookingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Book room {} on {}", self.room, self.date)
    }

    fn state(&self) -> &StepState<BookingSite> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState<BookingSite> {
        &mut self.state
    }

    async fn execute(&mut self, ctx: &ScenarioContext, env: &mut BookingSite) -> Result<bool, StepFault> {
        let state = &mut self.state;
        let ok = act(state, env, "FillTool", json!({"selector": "#room", "value": self.room}), "Filling room number").await?
            && act(state, env, "FillTool", json!({"selector": "#date", "value": self.date}), "Filling date").await?
            && act(state, env, "ClickTool", json!({"selector": "#book"}), "Submitting booking").await?;
        if !ok {
            return Ok(false);
        }
        self.verify_success(ctx, env).await
    }

    async fn verify_success(&self, _ctx: &ScenarioContext, env: &BookingSite) -> Result<bool, StepFault> {
        Ok(env.is_booked(&self.room, &self.date))
    }
}

/// Next Thursday strictly after `today`
#[must_use]
pub fn next_thursday(today: NaiveDate) -> NaiveDate {
    let ahead = (7 + Weekday::Thu.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    today + Days::days(if ahead == 0 { 7 } else { i64::from(ahead) })
}

/// Books rooms on the simulated site
pub struct BookingScenario {
    broker: Arc<dyn EscalationBroker>,
    human_timeout: Duration,
}

impl BookingScenario {
    /// Create scenario whose steps escalate through `broker`
    #[must_use]
    pub fn new(broker: Arc<dyn EscalationBroker>) -> Self {
        Self {
            broker,
            human_timeout: DEFAULT_HUMAN_TIMEOUT,
        }
    }

    /// With human answer timeout
    #[must_use]
    pub fn with_human_timeout(mut self, timeout: Duration) -> Self {
        self.human_timeout = timeout;
        self
    }

    fn tools(&self) -> Result<ToolRegistry<BookingSite>, ScenarioError> {
        site_tools(Arc::clone(&self.broker), self.human_timeout)
            .map_err(|e| ScenarioError::Plan(e.to_string()))
    }
}

#[async_trait]
impl Scenario<BookingSite> for BookingScenario {
    fn name(&self) -> &str {
        "booking"
    }

    fn classify_intent(&self, command: &str) -> f64 {
        let command = command.to_lowercase();
        if ["book", "reserv"].iter().any(|stem| command.contains(stem)) {
            1.0
        } else {
            0.0
        }
    }

    async fn parse_command(&self, command: &str) -> Result<ParsedParams, ScenarioError> {
        if command.trim().is_empty() {
            return Err(ScenarioError::Parse("empty command".to_string()));
        }

        let mut rooms: Vec<String> = Vec::new();
        let mut date = None;
        for token in command.split(|c: char| c.is_whitespace() || c == ',') {
            if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
                if !rooms.iter().any(|r| r == token) {
                    rooms.push(token.to_string());
                }
            } else if let Ok(parsed) = NaiveDate::parse_from_str(token, DATE_FORMAT) {
                date = Some(parsed);
            }
        }

        if rooms.is_empty() {
            tracing::info!(rooms = ?PREFERRED_ROOMS, "no room numbers in command, using preferred rooms");
            rooms = PREFERRED_ROOMS.iter().map(|r| (*r).to_string()).collect();
        }
        let date = date.unwrap_or_else(|| next_thursday(Local::now().date_naive()));

        let params = args(json!({
            "rooms": rooms,
            "date": date.format(DATE_FORMAT).to_string(),
        }));
        tracing::info!(params = %serde_json::Value::Object(params.clone()), "parsed booking parameters");
        Ok(params)
    }

    fn build_steps(&self, params: &ParsedParams) -> Result<Plan<BookingSite>, ScenarioError> {
        let date = params
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| ScenarioError::Plan("missing booking date".to_string()))?;
        let rooms: Vec<&str> = params
            .get("rooms")
            .and_then(Value::as_array)
            .map(|rooms| rooms.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if rooms.is_empty() {
            return Err(ScenarioError::Plan("no rooms to book".to_string()));
        }

        let mut plan: Plan<BookingSite> = vec![
            Box::new(LoginStep::new(self.tools()?)),
            Box::new(NavigateStep::new(self.tools()?)),
        ];
        for room in rooms {
            plan.push(Box::new(RoomBookingStep::new(room, date, self.tools()?)));
        }
        Ok(plan)
    }
}

impl std::fmt::Debug for BookingScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingScenario")
            .field("human_timeout", &self.human_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_escalation::InMemoryBroker;

    fn scenario() -> BookingScenario {
        BookingScenario::new(Arc::new(InMemoryBroker::new()))
    }

    #[test]
    fn thursday_is_always_ahead() {
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let thursday = NaiveDate::from_ymd_opt(2026, 10, 22).unwrap();
        assert_eq!(next_thursday(monday), thursday);
        assert_eq!(next_thursday(thursday), NaiveDate::from_ymd_opt(2026, 10, 29).unwrap());
    }

    #[test]
    fn intent_needs_booking_stem() {
        assert!((scenario().classify_intent("Book room 101") - 1.0).abs() < f64::EPSILON);
        assert!(scenario().classify_intent("what's the weather").abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn parses_rooms_and_date() {
        let params = scenario()
            .parse_command("book rooms 101, 204 on 2026-10-20")
            .await
            .unwrap();
        assert_eq!(params["rooms"], json!(["101", "204"]));
        assert_eq!(params["date"], json!("2026-10-20"));

        let plan = scenario().build_steps(&params).unwrap();
        let names: Vec<&str> = plan.iter().map(|step| step.name()).collect();
        assert_eq!(names, ["login", "navigate", "book_room_101", "book_room_204"]);
    }

    #[tokio::test]
    async fn falls_back_to_preferred_rooms() {
        let params = scenario().parse_command("reserve something").await.unwrap();
        assert_eq!(params["rooms"], json!(PREFERRED_ROOMS));
    }

    #[tokio::test]
    async fn empty_command_does_not_parse() {
        assert!(matches!(
            scenario().parse_command("  ").await,
            Err(ScenarioError::Parse(_))
        ));
    }
}
