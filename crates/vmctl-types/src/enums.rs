//! State enums and their helper predicates.
//!
//! Values and helper methods mirror the original system's enum module
//! exactly; Rust gives us exhaustive matches in place of the original's
//! membership-in-a-list checks.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Machine`](crate::Machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Created,
    Deployed,
    Running,
    Stopped,
    Undeployed,
    Failed,
    /// A hypervisor operation failed in a way that leaves the machine's
    /// state unknown. Not named in the original distilled list of
    /// states but present in the enum this was modeled on; kept
    /// because `can_be_changed` and the error-surfacing paths in
    /// requests both need a terminal-but-not-undeployed state.
    Errored,
}

impl MachineState {
    /// A machine's state cannot be changed once it is undeployed or
    /// failed — those are terminal. Every other state, including
    /// `Errored`, still accepts further lifecycle transitions.
    #[must_use]
    pub fn can_be_changed(self) -> bool {
        !matches!(self, Self::Undeployed | Self::Failed)
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Deployed => "deployed",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Undeployed => "undeployed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Outcome state of a [`Request`](crate::Request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Success,
    Failed,
    Delayed,
    Timeouted,
    Aborted,
}

impl RequestState {
    /// A request has finished once it succeeded or hit one of the
    /// error states; `Delayed` and `Created` are still in flight.
    #[must_use]
    pub fn has_finished(self) -> bool {
        self == Self::Success || self.is_error()
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::Timeouted | Self::Aborted)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
            Self::Timeouted => "timeouted",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Kind of operation a [`Request`](crate::Request) asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Deploy,
    Undeploy,
    Start,
    Stop,
    #[serde(rename = "restart")]
    Reset,
    GetInfo,
    TakeScreenshot,
    TakeSnapshot,
    RestoreSnapshot,
    DeleteSnapshot,
}

impl RequestType {
    /// Only these four request types move a [`Machine`](crate::Machine)
    /// between lifecycle states; the rest (info/snapshot/screenshot
    /// operations) leave `Machine::state` untouched.
    #[must_use]
    pub fn can_change_machine_state(self) -> bool {
        matches!(self, Self::Start | Self::Stop | Self::Deploy | Self::Undeploy)
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deploy => "deploy",
            Self::Undeploy => "undeploy",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "restart",
            Self::GetInfo => "get_info",
            Self::TakeScreenshot => "take_screenshot",
            Self::TakeSnapshot => "take_snapshot",
            Self::RestoreSnapshot => "restore_snapshot",
            Self::DeleteSnapshot => "delete_snapshot",
        };
        f.write_str(s)
    }
}

/// vSphere-style connection state of a [`HostRuntimeInfo`](crate::HostRuntimeInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostConnectionState {
    Connected,
    Disconnected,
    NotResponding,
}

impl std::fmt::Display for HostConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NotResponding => "notResponding",
        };
        f.write_str(s)
    }
}

/// Standby transition state of a [`HostRuntimeInfo`](crate::HostRuntimeInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStandbyMode {
    Entering,
    Exiting,
    In,
    None,
}

impl std::fmt::Display for HostStandbyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Entering => "entering",
            Self::Exiting => "exiting",
            Self::In => "in",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(MachineState::Created, true)]
    #[test_case(MachineState::Running, true)]
    #[test_case(MachineState::Errored, true)]
    #[test_case(MachineState::Undeployed, false)]
    #[test_case(MachineState::Failed, false)]
    fn machine_state_can_be_changed(state: MachineState, expected: bool) {
        assert_eq!(state.can_be_changed(), expected);
    }

    #[test_case(RequestState::Success, true, false)]
    #[test_case(RequestState::Failed, true, true)]
    #[test_case(RequestState::Timeouted, true, true)]
    #[test_case(RequestState::Aborted, true, true)]
    #[test_case(RequestState::Created, false, false)]
    #[test_case(RequestState::Delayed, false, false)]
    fn request_state_finished_and_error(state: RequestState, finished: bool, error: bool) {
        assert_eq!(state.has_finished(), finished);
        assert_eq!(state.is_error(), error);
    }

    #[test_case(RequestType::Deploy, true)]
    #[test_case(RequestType::Undeploy, true)]
    #[test_case(RequestType::Start, true)]
    #[test_case(RequestType::Stop, true)]
    #[test_case(RequestType::Reset, false)]
    #[test_case(RequestType::GetInfo, false)]
    #[test_case(RequestType::TakeSnapshot, false)]
    fn request_type_changes_machine_state(kind: RequestType, expected: bool) {
        assert_eq!(kind.can_change_machine_state(), expected);
    }

    #[test]
    fn reset_wire_vocabulary_is_restart() {
        assert_eq!(serde_json::to_string(&RequestType::Reset).unwrap(), "\"restart\"");
        assert_eq!(RequestType::Reset.to_string(), "restart");
    }
}
