use bytes::Bytes;

use crate::protocol::error::Result;
use crate::protocol::frame::{string_frame, ByteCommand, FrameType, WireMessage};
use crate::protocol::plan::ZeroPlan;

/// An RPC request to a station.
///
/// Plain calls, file-attached calls and plan submissions all go through
/// [`CallRequest::to_message`]; files and the plan only add frames.
///
/// # Example
///
/// ```
/// use zeronet_common::protocol::call::CallRequest;
///
/// let request = CallRequest::new("v1/user/login", r#"{"name":"a"}"#)
///     .with_request_id("req-1")
///     .with_file("avatar.png", vec![0u8; 4]);
///
/// let message = request.to_message().unwrap();
/// // 8 call frames + 2 per file + service key
/// assert_eq!(message.declared_frame_count(), 11);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub command: String,
    pub argument: Option<String>,
    pub extend_argument: Option<String>,
    pub request_id: Option<String>,
    pub requester: Option<String>,
    /// Route name of the caller's organization, echoed back by workers.
    pub responser: Option<String>,
    pub call_id: Option<String>,
    /// Serialized caller context.
    pub context: Option<String>,
    pub files: Vec<(String, Bytes)>,
    pub plan: Option<ZeroPlan>,
}

impl CallRequest {
    pub fn new(command: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            argument: Some(argument.into()),
            ..Default::default()
        }
    }

    pub fn with_extend_argument(mut self, extend: impl Into<String>) -> Self {
        self.extend_argument = Some(extend.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn with_responser(mut self, responser: impl Into<String>) -> Self {
        self.responser = Some(responser.into());
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.files.push((name.into(), content.into()));
        self
    }

    pub fn with_plan(mut self, plan: ZeroPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Builds the wire message.
    ///
    /// Verb is `Plan` when a plan is attached, `General` otherwise. File
    /// pairs come after `Context` (and after `Plan` when present).
    pub fn to_message(&self) -> Result<WireMessage> {
        let verb = if self.plan.is_some() {
            ByteCommand::Plan
        } else {
            ByteCommand::General
        };

        let mut message = WireMessage::new(verb)
            .frame(FrameType::Command, string_frame(Some(&self.command)))
            .frame(FrameType::Argument, string_frame(self.argument.as_deref()))
            .frame(FrameType::TextContent, string_frame(self.extend_argument.as_deref()))
            .frame(FrameType::RequestId, string_frame(self.request_id.as_deref()))
            .frame(FrameType::Requester, string_frame(self.requester.as_deref()))
            .frame(FrameType::Responser, string_frame(self.responser.as_deref()))
            .frame(FrameType::CallId, string_frame(self.call_id.as_deref()))
            .frame(FrameType::Context, string_frame(self.context.as_deref()));

        if let Some(plan) = &self.plan {
            message.push(FrameType::Plan, plan.to_json()?);
        }

        for (name, content) in &self.files {
            message.push(FrameType::ExtendText, string_frame(Some(name)));
            message.push(FrameType::BinaryContent, content.clone());
        }

        Ok(message)
    }
}
