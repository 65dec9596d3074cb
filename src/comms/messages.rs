use geojson::{Feature, FeatureCollection};
use serde::{Deserialize, Serialize};

use crate::geometry::DrawMode;

/// Why a job was dispatched, echoed back with its result so it can be routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobSource {
    DrawingEnd,
    ModifyEnd,
    Flatten,
    Init,
    Upload,
    ExternalImport,
}

impl JobSource {
    /// Jobs whose result is one merged region rather than one result per shape
    pub fn is_aggregate(&self) -> bool {
        matches!(self, JobSource::Flatten | JobSource::Init)
    }
}

/// One shape handed to the compute unit: its canonical polygon and tracking id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    pub geometry: Feature,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "camelCase")]
pub enum UploadPayload {
    // raw file contents, the format is told by the file name
    File { name: String, contents: String },
    Features { collection: FeatureCollection },
}

/// Controller -> compute unit. `id` is the sentinel job id, -1 when unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ComputeJob {
    Start {
        id: i64,
        generation: u64,
        source: JobSource,
        items: Vec<JobItem>,
    },
    Flatten {
        id: i64,
        generation: u64,
        source: JobSource,
        items: Vec<JobItem>,
    },
    Upload {
        id: i64,
        generation: u64,
        source: JobSource,
        payload: UploadPayload,
    },
}

impl ComputeJob {
    pub fn generation(&self) -> u64 {
        match self {
            ComputeJob::Start { generation, .. }
            | ComputeJob::Flatten { generation, .. }
            | ComputeJob::Upload { generation, .. } => *generation,
        }
    }

    pub fn source(&self) -> JobSource {
        match self {
            ComputeJob::Start { source, .. }
            | ComputeJob::Flatten { source, .. }
            | ComputeJob::Upload { source, .. } => *source,
        }
    }
}

/// Compute unit -> controller. Progress messages may be skipped,
/// every job ends in exactly one `Done` unless a fatal error abandons it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ComputeStatus {
    OpeningFile { generation: u64 },
    ProcessingFile { generation: u64 },
    ProcessingFeatures { generation: u64 },
    Calculating { generation: u64 },
    Done(JobDone),
    Error(JobError),
    UploadError(JobError),
}

impl ComputeStatus {
    /// The human readable phase of a progress message
    pub fn phase_label(&self) -> Option<&'static str> {
        match self {
            ComputeStatus::OpeningFile { .. } | ComputeStatus::ProcessingFile { .. } => Some("Opening"),
            ComputeStatus::ProcessingFeatures { .. } => Some("Converting"),
            ComputeStatus::Calculating { .. } => Some("Calculating"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDone {
    pub id: i64,
    pub generation: u64,
    pub source: JobSource,
    pub data: JobData,
}

/// Per shape results for start and upload jobs, one optional region for flatten/init
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobData {
    Items(Vec<ItemResult>),
    Aggregate(Option<AggregateResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub id: i64,
    pub wkt: String,
    // acres
    pub area: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_id: Option<u64>,
    // only for uploads, the shape the controller should commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub wkt: String,
    pub area: f64,
    pub geometry: Feature,
    #[serde(default)]
    pub dropped_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub generation: Option<u64>,
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
}

/// What the host application is told
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum HostEvent {
    DrawingStarted,
    DrawingEnded(ShapeReport),
    #[serde(rename_all = "camelCase")]
    ModifyEnd {
        modified_shapes: Vec<ModifiedShape>,
    },
    Flattened(Option<ShapeReport>),
    StatusUpdate {
        status: Status,
    },
    FileUploaded,
    #[serde(rename_all = "camelCase")]
    MergeDiagnostics {
        dropped_ids: Vec<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub acres: f64,
    pub wkt: String,
    pub id: i64,
}

impl ShapeReport {
    pub fn polygon(acres: f64, wkt: String, id: i64) -> Self {
        ShapeReport {
            kind: "Polygon".to_string(),
            acres,
            wkt,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedShape {
    pub wkt: String,
    pub acres: f64,
    pub id: i64,
    pub edit_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Status {
    Phase(String),
    Error { error: Vec<String> },
}

/// A shape from the server, WKT in the working frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerShape {
    pub id: i64,
    pub wkt: String,
}

/// What the host application can ask for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum HostCommand {
    SetBuffer(f64),
    StartDrawingWithMode(DrawMode),
    EnableModify,
    DisableModify,
    DisableDraw,
    SelectById { id: i64, selected: bool },
    DeleteById(i64),
    SetShapes { shapes: Vec<ServerShape>, clear: bool },
    AddReferenceItems(Vec<Feature>),
    Upload { name: String, contents: String },
    ExternalImport(FeatureCollection),
}
