//! 上传会话状态机
//!
//! 管理上传会话从创建到可查看的状态转换

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vizor_core::{Result, SessionStatus, VizorError};

/// 会话状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    UploadStarted,
    UploadCompleted,
    ImportStarted,
    ImportSucceeded,
    Failed,
}

/// 会话状态机
#[derive(Debug)]
pub struct SessionStateMachine {
    transitions: HashMap<(SessionStatus, SessionEvent), SessionStatus>,
}

impl SessionStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 上传阶段由签发上传地址的一方推进
        transitions.insert((SessionStatus::Pending, SessionEvent::UploadStarted), SessionStatus::Uploading);
        transitions.insert((SessionStatus::Uploading, SessionEvent::UploadCompleted), SessionStatus::Uploaded);

        // 导入可能被重复投递，任何状态都允许重新进入导入
        for from in Self::get_all_states() {
            transitions.insert((from, SessionEvent::ImportStarted), SessionStatus::Importing);
        }
        transitions.insert((SessionStatus::Importing, SessionEvent::ImportSucceeded), SessionStatus::Ready);

        for from in [
            SessionStatus::Pending,
            SessionStatus::Uploading,
            SessionStatus::Uploaded,
            SessionStatus::Importing,
        ] {
            transitions.insert((from, SessionEvent::Failed), SessionStatus::Error);
        }

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: SessionStatus, event: SessionEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: SessionStatus, event: SessionEvent) -> Result<SessionStatus> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| VizorError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            })
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<SessionStatus> {
        vec![
            SessionStatus::Pending,
            SessionStatus::Uploading,
            SessionStatus::Uploaded,
            SessionStatus::Importing,
            SessionStatus::Ready,
            SessionStatus::Error,
        ]
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let sm = SessionStateMachine::new();
        let mut status = SessionStatus::Pending;
        for event in [
            SessionEvent::UploadStarted,
            SessionEvent::UploadCompleted,
            SessionEvent::ImportStarted,
            SessionEvent::ImportSucceeded,
        ] {
            status = sm.transition(status, event).unwrap();
        }
        assert_eq!(status, SessionStatus::Ready);
    }

    #[test]
    fn test_import_reentry_from_any_state() {
        let sm = SessionStateMachine::new();
        for from in SessionStateMachine::get_all_states() {
            assert_eq!(
                sm.transition(from, SessionEvent::ImportStarted).unwrap(),
                SessionStatus::Importing
            );
        }
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = SessionStateMachine::new();
        assert!(!sm.can_transition(SessionStatus::Uploaded, SessionEvent::ImportSucceeded));
        assert!(!sm.can_transition(SessionStatus::Ready, SessionEvent::Failed));
        assert!(!sm.can_transition(SessionStatus::Pending, SessionEvent::UploadCompleted));

        let result = sm.transition(SessionStatus::Error, SessionEvent::ImportSucceeded);
        assert!(matches!(result, Err(VizorError::InvalidStateTransition { .. })));
    }
}
