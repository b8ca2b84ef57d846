//! Caregiver notification.
//!
//! The escalation controller only sees [`NotificationDispatcher`]. The
//! platform layer decides which [`Channel`]s exist and hands them to a
//! [`ChannelDispatcher`], which tries each one in order and never retries.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::error::ChannelError;
use crate::types::{AlertContext, Contact, PerceptionFrame, SessionId};

pub trait NotificationDispatcher {
    fn dispatch(&mut self, target: Option<&Contact>, context: &AlertContext) -> DispatchOutcome;
}

impl<D: NotificationDispatcher + ?Sized> NotificationDispatcher for Box<D> {
    fn dispatch(&mut self, target: Option<&Contact>, context: &AlertContext) -> DispatchOutcome {
        (**self).dispatch(target, context)
    }
}

/// One way of reaching a caregiver.
pub trait Channel {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, target: Option<&Contact>, context: &AlertContext)
        -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: &'static str,
    pub result: Result<(), ChannelError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub session: SessionId,
    pub reports: Vec<ChannelReport>,
    /// Set when the session had already been dispatched and nothing was sent.
    pub duplicate: bool,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn all_failed(&self) -> bool {
        !self.duplicate && self.delivered() == 0
    }
}

#[derive(Default)]
pub struct ChannelDispatcher {
    channels: Vec<Box<dyn Channel>>,
    last_session: Option<SessionId>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: impl Channel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&mut self, target: Option<&Contact>, context: &AlertContext) -> DispatchOutcome {
        // Session ids only grow, so anything at or below the last one has
        // already been handled.
        if self.last_session.is_some_and(|last| last >= context.session) {
            warn!(session = context.session.0, "dispatch already issued for session, ignoring");
            return DispatchOutcome {
                session: context.session,
                reports: Vec::new(),
                duplicate: true,
            };
        }
        self.last_session = Some(context.session);

        let mut reports = Vec::with_capacity(self.channels.len());
        for channel in &mut self.channels {
            let result = channel.deliver(target, context);
            if let Err(e) = &result {
                warn!(session = context.session.0, channel = channel.name(), error = %e, "channel failed");
            }
            reports.push(ChannelReport {
                channel: channel.name(),
                result,
            });
        }

        let outcome = DispatchOutcome {
            session: context.session,
            reports,
            duplicate: false,
        };
        if outcome.all_failed() {
            warn!(session = context.session.0, "no channel reached the caregiver");
        } else {
            info!(
                session = context.session.0,
                delivered = outcome.delivered(),
                attempted = outcome.reports.len(),
                "caregiver notified"
            );
        }
        outcome
    }
}

/// Signal picked up by whatever renders the alarm locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCue {
    pub session: SessionId,
    pub contact: Option<Contact>,
    pub frame: Option<PerceptionFrame>,
}

pub struct AlertCueChannel {
    tx: Sender<AlertCue>,
}

impl AlertCueChannel {
    pub fn new() -> (Self, Receiver<AlertCue>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Channel for AlertCueChannel {
    fn name(&self) -> &'static str {
        "alert-cue"
    }

    fn deliver(
        &mut self,
        target: Option<&Contact>,
        context: &AlertContext,
    ) -> Result<(), ChannelError> {
        self.tx
            .send(AlertCue {
                session: context.session,
                contact: target.cloned(),
                frame: context.frame,
            })
            .map_err(|_| ChannelError::Unavailable("alert cue receiver dropped".to_string()))
    }
}

/// Stands in for a system notification request by emitting a structured
/// log record.
#[derive(Debug, Default)]
pub struct LogChannel;

impl Channel for LogChannel {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn deliver(
        &mut self,
        target: Option<&Contact>,
        context: &AlertContext,
    ) -> Result<(), ChannelError> {
        let who = target.map_or("unconfigured", |c| c.name.as_str());
        warn!(
            session = context.session.0,
            contact = who,
            "FALL DETECTED: notifying caregiver"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub session: SessionId,
    pub uri: String,
    pub contact: Contact,
}

/// Hands `tel:` dial requests to the device integration layer.
pub struct DialChannel {
    tx: Sender<DialRequest>,
}

impl DialChannel {
    pub fn new() -> (Self, Receiver<DialRequest>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Channel for DialChannel {
    fn name(&self) -> &'static str {
        "dial"
    }

    fn deliver(
        &mut self,
        target: Option<&Contact>,
        context: &AlertContext,
    ) -> Result<(), ChannelError> {
        let contact = target.ok_or(ChannelError::NoContact)?;
        let number = dialable_number(contact)?;

        self.tx
            .send(DialRequest {
                session: context.session,
                uri: format!("tel:{number}"),
                contact: contact.clone(),
            })
            .map_err(|_| ChannelError::Unavailable("dial receiver dropped".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRequest {
    pub session: SessionId,
    pub uri: String,
    pub body: String,
    pub contact: Contact,
}

/// Hands pre-composed `sms:` text messages to the device integration layer.
pub struct SmsChannel {
    tx: Sender<SmsRequest>,
}

impl SmsChannel {
    pub fn new() -> (Self, Receiver<SmsRequest>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Channel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn deliver(
        &mut self,
        target: Option<&Contact>,
        context: &AlertContext,
    ) -> Result<(), ChannelError> {
        let contact = target.ok_or(ChannelError::NoContact)?;
        let number = dialable_number(contact)?;
        let body = match context.frame {
            Some(frame) => format!(
                "Fall detected at t={}ms. Please check in now.",
                frame.timestamp_ms
            ),
            None => "Fall detected. Please check in now.".to_string(),
        };

        self.tx
            .send(SmsRequest {
                session: context.session,
                uri: format!("sms:{number}?body={}", encode_query(&body)),
                body,
                contact: contact.clone(),
            })
            .map_err(|_| ChannelError::Unavailable("sms receiver dropped".to_string()))
    }
}

fn dialable_number(contact: &Contact) -> Result<String, ChannelError> {
    let number: String = contact
        .number
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if number.is_empty() {
        return Err(ChannelError::Unavailable(format!(
            "contact {:?} has no dialable number",
            contact.name
        )));
    }
    Ok(number)
}

/// Percent-encodes everything outside the URI unreserved set.
fn encode_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
