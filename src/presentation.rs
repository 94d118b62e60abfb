//! 状态展示提示
//!
//! 运行状态到界面颜色和"需要处理"标记的映射

use crate::host::RunState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 状态颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    /// 已停止
    Red,
    /// 运行中
    Green,
    /// 过渡状态
    Yellow,
    /// 其他状态
    WhiteSmoke,
}

impl StatusColor {
    /// 飞书卡片标题模板颜色
    pub fn card_template(&self) -> &'static str {
        match self {
            StatusColor::Red => "red",
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::WhiteSmoke => "grey",
        }
    }

    /// 终端 ANSI 颜色代码
    pub fn ansi_code(&self) -> &'static str {
        match self {
            StatusColor::Red => "31",
            StatusColor::Green => "32",
            StatusColor::Yellow => "33",
            StatusColor::WhiteSmoke => "37",
        }
    }
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusColor::Red => "red",
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::WhiteSmoke => "whitesmoke",
        };
        write!(f, "{name}")
    }
}

/// 运行状态对应的颜色
pub fn status_color(state: RunState) -> StatusColor {
    match state {
        RunState::Stopped => StatusColor::Red,
        RunState::Running => StatusColor::Green,
        RunState::StartPending | RunState::StopPending => StatusColor::Yellow,
        RunState::PausePending | RunState::Paused => StatusColor::WhiteSmoke,
    }
}

/// 是否需要人工处理（只有已停止的服务需要提示重启）
pub fn needs_attention(state: RunState) -> bool {
    state == RunState::Stopped
}
