//! Room parameters and the design request envelope
//!
//! Parameters are validated before any request leaves the process; the
//! generation service is slow and never told about obviously broken rooms.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Microphone types offered by the design form
pub const MIC_TYPES: [&str; 5] = [
    "手持无线话筒",
    "鹅颈会议话筒",
    "全向阵列话筒",
    "领夹话筒",
    "吊装话筒",
];

/// Slack allowed between the farthest audience distance and the room diagonal
const FAR_AUDIENCE_SLACK_M: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    #[default]
    MeetingRoom,
    LectureHall,
}

impl Scenario {
    pub fn label(&self) -> &'static str {
        match self {
            Scenario::MeetingRoom => "会议室",
            Scenario::LectureHall => "报告厅",
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "meeting_room" | "meeting" => Ok(Scenario::MeetingRoom),
            "lecture_hall" | "lecture" => Ok(Scenario::LectureHall),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub mic_type: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcousticParams {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub stage_to_near_audience: f64,
    pub stage_to_far_audience: f64,
    pub stage_width: f64,
    pub stage_depth: f64,
    pub has_central_control: bool,
    pub has_matrix: bool,
    pub has_video_conf: bool,
    pub has_recording: bool,
    pub mics: Vec<MicConfig>,
    pub extra_requirements: String,
}

impl Default for AcousticParams {
    fn default() -> Self {
        Self {
            length: 12.0,
            width: 8.0,
            height: 3.5,
            stage_to_near_audience: 2.0,
            stage_to_far_audience: 15.0,
            stage_width: 10.0,
            stage_depth: 5.0,
            has_central_control: true,
            has_matrix: true,
            has_video_conf: false,
            has_recording: false,
            mics: vec![MicConfig {
                id: "1".to_string(),
                mic_type: MIC_TYPES[0].to_string(),
                count: 2,
            }],
            extra_requirements: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("房间长、宽、安装高度必须大于 0")]
    NonPositiveRoom,
    #[error("报告厅参数：台口至最近、台口至最远、台口宽度、舞台深度必须大于 0")]
    NonPositiveStage,
    #[error("“台口至最近” 必须小于 “台口至最远”")]
    NearNotBeforeFar,
    #[error("台口宽度不能大于房间宽度")]
    StageWiderThanRoom,
    #[error("舞台深度不能大于房间长度")]
    StageDeeperThanRoom,
    #[error("“台口至最远观众距离”过大（{far}m），建议不超过房间对角线（约 {diagonal:.1}m）")]
    FarAudienceTooDistant { far: f64, diagonal: f64 },
}

impl AcousticParams {
    /// Check the room geometry for `scenario`.
    pub fn validate(&self, scenario: Scenario) -> Result<(), ParamsError> {
        if self.length <= 0.0 || self.width <= 0.0 || self.height <= 0.0 {
            return Err(ParamsError::NonPositiveRoom);
        }
        if scenario == Scenario::MeetingRoom {
            return Ok(());
        }

        if self.stage_to_near_audience <= 0.0
            || self.stage_to_far_audience <= 0.0
            || self.stage_width <= 0.0
            || self.stage_depth <= 0.0
        {
            return Err(ParamsError::NonPositiveStage);
        }
        if self.stage_to_near_audience >= self.stage_to_far_audience {
            return Err(ParamsError::NearNotBeforeFar);
        }
        if self.stage_width > self.width {
            return Err(ParamsError::StageWiderThanRoom);
        }
        if self.stage_depth > self.length {
            return Err(ParamsError::StageDeeperThanRoom);
        }

        let diagonal = self.length.hypot(self.width);
        if self.stage_to_far_audience > diagonal + FAR_AUDIENCE_SLACK_M {
            return Err(ParamsError::FarAudienceTooDistant {
                far: self.stage_to_far_audience,
                diagonal,
            });
        }
        Ok(())
    }

    /// Add a microphone group with the first known type
    pub fn add_mic(&mut self) -> &MicConfig {
        let id = uuid::Uuid::new_v4().to_string();
        self.mics.push(MicConfig {
            id,
            mic_type: MIC_TYPES[0].to_string(),
            count: 1,
        });
        &self.mics[self.mics.len() - 1]
    }

    pub fn set_mic_count(&mut self, id: &str, count: u32) -> bool {
        match self.mics.iter_mut().find(|mic| mic.id == id) {
            Some(mic) => {
                mic.count = count;
                true
            }
            None => false,
        }
    }

    pub fn remove_mic(&mut self, id: &str) -> bool {
        let before = self.mics.len();
        self.mics.retain(|mic| mic.id != id);
        self.mics.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_to_near_audience: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_to_far_audience: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_depth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSignals {
    pub scenario: Scenario,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsystems {
    pub has_central_control: bool,
    pub has_matrix: bool,
    pub has_video_conf: bool,
    pub has_recording: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSignals {
    pub mics: Vec<MicConfig>,
    pub subsystems: Subsystems,
    #[serde(rename = "extraRequirements", skip_serializing_if = "String::is_empty", default)]
    pub extra_requirements: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSignals {
    pub target: String,
}

/// Request envelope the generation service consumes as its `inputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticIntent {
    pub schema_version: String,
    pub intent_type: String,
    #[serde(rename = "inputSignals")]
    pub input_signals: InputSignals,
    #[serde(rename = "processingSignals")]
    pub processing_signals: ProcessingSignals,
    #[serde(rename = "outputSignals")]
    pub output_signals: OutputSignals,
    pub timestamp: String,
}

impl AcousticIntent {
    /// Build the envelope. Stage fields are only sent for lecture halls.
    pub fn build(scenario: Scenario, params: &AcousticParams) -> Self {
        let lecture = scenario == Scenario::LectureHall;
        let stage = |value: f64| lecture.then_some(value);

        Self {
            schema_version: "v1".to_string(),
            intent_type: "acoustic_design".to_string(),
            input_signals: InputSignals {
                scenario,
                geometry: Geometry {
                    length: params.length,
                    width: params.width,
                    height: params.height,
                    stage_to_near_audience: stage(params.stage_to_near_audience),
                    stage_to_far_audience: stage(params.stage_to_far_audience),
                    stage_width: stage(params.stage_width),
                    stage_depth: stage(params.stage_depth),
                },
            },
            processing_signals: ProcessingSignals {
                mics: params.mics.clone(),
                subsystems: Subsystems {
                    has_central_control: params.has_central_control,
                    has_matrix: params.has_matrix,
                    has_video_conf: params.has_video_conf,
                    has_recording: params.has_recording,
                },
                extra_requirements: params.extra_requirements.clone(),
            },
            output_signals: OutputSignals {
                target: "acoustic_design_plan".to_string(),
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
