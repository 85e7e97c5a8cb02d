//! Simulated booking site
//!
//! An in-memory stand-in for the third-party web application: a handful of
//! pages, form fields addressed by selector, a login session and a list of
//! confirmed bookings. A [`SiteFault`] breaks one part of the site so the
//! recovery path can be exercised.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use stepwise_tools::{
    optional_str_list, require_str, Environment, ParamSpec, Tool, ToolFault, ToolParams,
    ToolResponse, ToolSpec,
};

/// Login page
pub const LOGIN_URL: &str = "https://booking.example/login";
/// Account page shown after login
pub const ACCOUNT_URL: &str = "https://booking.example/account";
/// Room booking form
pub const ROOMS_URL: &str = "https://booking.example/rooms";
/// Room booking form when [`SiteFault::Navigate`] is active
pub const MOVED_ROOMS_URL: &str = "https://booking.example/booking/rooms";

/// Demo account name
pub const DEMO_USER: &str = "demo";
/// Demo account password
pub const DEMO_PASSWORD: &str = "demo-pass";

/// Text that only appears on the login page
pub const LOGIN_MARKER: &str = "Username or E-mail";
/// Text that only appears once logged in
pub const ACCOUNT_MARKER: &str = "Personal account";
/// Text that only appears on the booking form
pub const ROOMS_MARKER: &str = "Room booking form";

/// Deliberate breakage of the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SiteFault {
    /// Password input is `#pass` instead of `#password`
    Login,
    /// Booking form moved to [`MOVED_ROOMS_URL`]
    Navigate,
    /// Submit button is `#confirm` instead of `#book`
    Booking,
}

/// A confirmed booking
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Booking {
    /// Room number
    pub room: String,
    /// Booking date
    pub date: String,
}

/// In-memory booking application
#[derive(Debug, Clone)]
pub struct BookingSite {
    url: String,
    fields: BTreeMap<String, String>,
    session: Option<String>,
    bookings: BTreeSet<Booking>,
    fault: Option<SiteFault>,
}

impl Default for BookingSite {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingSite {
    /// Fresh site on a blank page
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: "about:blank".to_string(),
            fields: BTreeMap::new(),
            session: None,
            bookings: BTreeSet::new(),
            fault: None,
        }
    }

    /// With a deliberate breakage
    #[must_use]
    pub fn with_fault(mut self, fault: Option<SiteFault>) -> Self {
        self.fault = fault;
        self
    }

    /// Logged-in user
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Confirmed bookings
    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter()
    }

    /// Whether `room` is booked on `date`
    #[must_use]
    pub fn is_booked(&self, room: &str, date: &str) -> bool {
        self.bookings.contains(&Booking {
            room: room.to_string(),
            date: date.to_string(),
        })
    }

    fn rooms_url(&self) -> &'static str {
        if self.fault == Some(SiteFault::Navigate) {
            MOVED_ROOMS_URL
        } else {
            ROOMS_URL
        }
    }

    fn inputs(&self) -> &'static [&'static str] {
        match self.url.as_str() {
            LOGIN_URL if self.fault == Some(SiteFault::Login) => &["#username", "#pass"],
            LOGIN_URL => &["#username", "#password"],
            url if url == self.rooms_url() && self.session.is_some() => &["#room", "#date"],
            _ => &[],
        }
    }

    fn buttons(&self) -> &'static [&'static str] {
        match self.url.as_str() {
            LOGIN_URL => &["#login"],
            url if url == self.rooms_url() && self.session.is_some() => {
                if self.fault == Some(SiteFault::Booking) {
                    &["#confirm"]
                } else {
                    &["#book"]
                }
            }
            _ => &[],
        }
    }

    /// Text content of the current page
    #[must_use]
    pub fn page_text(&self) -> String {
        let url = self.url.as_str();
        if url == LOGIN_URL {
            return format!("Sign in\n{LOGIN_MARKER}\nPassword");
        }
        if url != ACCOUNT_URL && url != self.rooms_url() {
            return "404 Not Found".to_string();
        }
        if self.session.is_none() {
            return format!("Sign in\n{LOGIN_MARKER}");
        }
        if url == ACCOUNT_URL {
            return format!("{ACCOUNT_MARKER}\nApplication center\nRoom booking");
        }
        let confirmed: Vec<String> = self
            .bookings
            .iter()
            .map(|b| format!("Booked: room {} on {}", b.room, b.date))
            .collect();
        format!("{ROOMS_MARKER}\nRoom\nDate\n{}", confirmed.join("\n"))
    }

    /// Go to `url`; protected pages bounce to the login page
    pub fn navigate(&mut self, url: &str) -> bool {
        self.fields.clear();
        let protected = [ACCOUNT_URL, self.rooms_url()].contains(&url);
        if protected && self.session.is_none() {
            self.url = LOGIN_URL.to_string();
            return true;
        }
        self.url = url.to_string();
        self.page_text() != "404 Not Found"
    }

    /// Type into an input; false when the selector is not on the page
    pub fn fill(&mut self, selector: &str, value: &str) -> bool {
        if !self.inputs().contains(&selector) {
            return false;
        }
        self.fields.insert(selector.to_string(), value.to_string());
        true
    }

    /// Press a button; false when the selector is not on the page
    pub fn click(&mut self, selector: &str) -> bool {
        if !self.buttons().contains(&selector) {
            return false;
        }
        match selector {
            "#login" => {
                let password = self
                    .fields
                    .get("#password")
                    .or_else(|| self.fields.get("#pass"));
                if self.fields.get("#username").map(String::as_str) == Some(DEMO_USER)
                    && password.map(String::as_str) == Some(DEMO_PASSWORD)
                {
                    self.session = Some(DEMO_USER.to_string());
                    self.url = ACCOUNT_URL.to_string();
                }
                self.fields.clear();
            }
            _ => {
                if let (Some(room), Some(date)) = (self.fields.get("#room"), self.fields.get("#date")) {
                    self.bookings.insert(Booking {
                        room: room.clone(),
                        date: date.clone(),
                    });
                }
            }
        }
        true
    }
}

#[async_trait]
impl Environment for BookingSite {
    fn current_address(&self) -> String {
        self.url.clone()
    }

    async fn describe_state(&self) -> String {
        format!(
            "{}\nInputs: {}\nButtons: {}",
            self.page_text(),
            self.inputs().join(", "),
            self.buttons().join(", ")
        )
    }
}

fn missing(what: &str, selector: &str) -> ToolResponse {
    ToolResponse::failure(format!("{what} `{selector}` not found on page"))
}

/// Open a page
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigateTool;

#[async_trait]
impl Tool<BookingSite> for NavigateTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Open a page by URL").param(ParamSpec::required("url", "absolute URL"))
    }

    async fn execute(&self, env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        let url = require_str(params, "url")?;
        if env.navigate(url) {
            Ok(ToolResponse::ok()
                .with_url(env.current_address())
                .with_narrative([format!("Opened {url}")]))
        } else {
            Ok(ToolResponse::failure(format!("{url} returned 404 Not Found")))
        }
    }
}

/// Type into a form field
#[derive(Debug, Clone, Copy, Default)]
pub struct FillTool;

#[async_trait]
impl Tool<BookingSite> for FillTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Type a value into a form field")
            .param(ParamSpec::required("selector", "CSS selector of the input"))
            .param(ParamSpec::required("value", "text to type"))
    }

    async fn execute(&self, env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        fill(env, params)
    }
}

/// Type a secret into a form field; the value never reaches the history
#[derive(Debug, Clone, Copy, Default)]
pub struct FillSecretTool;

#[async_trait]
impl Tool<BookingSite> for FillSecretTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Type a password or other secret into a form field")
            .param(ParamSpec::required("selector", "CSS selector of the input"))
            .param(ParamSpec::required("value", "secret to type").sensitive())
    }

    async fn execute(&self, env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        fill(env, params)
    }
}

fn fill(env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
    let selector = require_str(params, "selector")?;
    let value = require_str(params, "value")?;
    if env.fill(selector, value) {
        Ok(ToolResponse::ok().with_meta("selector", selector))
    } else {
        Ok(missing("Input", selector))
    }
}

/// Press a button
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickTool;

#[async_trait]
impl Tool<BookingSite> for ClickTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Click a button").param(ParamSpec::required("selector", "CSS selector of the button"))
    }

    async fn execute(&self, env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        let selector = require_str(params, "selector")?;
        if env.click(selector) {
            Ok(ToolResponse::ok()
                .with_url(env.current_address())
                .with_narrative([format!("Clicked {selector}")]))
        } else {
            Ok(missing("Button", selector))
        }
    }
}

/// Check that the page shows every given text
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckContentTool;

#[async_trait]
impl Tool<BookingSite> for CheckContentTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Check that the current page contains all given texts")
            .param(ParamSpec::required("texts", "list of texts"))
    }

    async fn execute(&self, env: &mut BookingSite, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        let texts = optional_str_list(params, "texts")?
            .ok_or_else(|| ToolFault::invalid_parameter("texts", "missing"))?;
        let page = env.page_text();
        let absent: Vec<&String> = texts.iter().filter(|text| !page.contains(text.as_str())).collect();
        if absent.is_empty() {
            Ok(ToolResponse::ok())
        } else {
            Ok(ToolResponse::failure(format!(
                "Page does not contain: {}",
                absent.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(", ")
            )))
        }
    }
}
