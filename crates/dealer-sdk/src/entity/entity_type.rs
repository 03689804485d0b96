//! 实体类型枚举
//!
//! 受控枚举：新增资源需要与后端路由同步升级。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 后台管理的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Make,
    Model,
    VehicleType,
    DriveType,
    Status,
    Vehicle,
    Sale,
    Enquiry,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        Self::Make,
        Self::Model,
        Self::VehicleType,
        Self::DriveType,
        Self::Status,
        Self::Vehicle,
        Self::Sale,
        Self::Enquiry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Model => "model",
            Self::VehicleType => "vehicle_type",
            Self::DriveType => "drive_type",
            Self::Status => "status",
            Self::Vehicle => "vehicle",
            Self::Sale => "sale",
            Self::Enquiry => "enquiry",
        }
    }

    /// REST 资源路径段（`/api/{segment}`）
    pub fn resource_segment(self) -> &'static str {
        match self {
            Self::Make => "makes",
            Self::Model => "models",
            Self::VehicleType => "vehicle-types",
            Self::DriveType => "drive-types",
            Self::Status => "statuses",
            Self::Vehicle => "vehicles",
            Self::Sale => "sales",
            Self::Enquiry => "contacts",
        }
    }

    /// 列表响应 `{data: {<key>: [...]}}` 中的集合字段名
    pub fn collection_key(self) -> &'static str {
        match self {
            Self::Make => "makes",
            Self::Model => "models",
            Self::VehicleType => "vehicleTypes",
            Self::DriveType => "driveTypes",
            Self::Status => "statuses",
            Self::Vehicle => "vehicles",
            Self::Sale => "sales",
            Self::Enquiry => "enquiries",
        }
    }

    /// 单条响应 `{data: {<key>: {...}}}` 中的字段名
    pub fn record_key(self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Model => "model",
            Self::VehicleType => "vehicleType",
            Self::DriveType => "driveType",
            Self::Status => "status",
            Self::Vehicle => "vehicle",
            Self::Sale => "sale",
            Self::Enquiry => "enquiry",
        }
    }

    /// 支持启用/停用切换的布尔字段；销售与咨询没有此开关
    pub fn toggle_field(self) -> Option<&'static str> {
        match self {
            Self::Sale | Self::Enquiry => None,
            _ => Some("isActive"),
        }
    }

    /// 列表页暴露的筛选字段
    pub fn filter_keys(self) -> &'static [&'static str] {
        match self {
            Self::Make | Self::VehicleType | Self::DriveType | Self::Status => &["isActive"],
            Self::Model => &["make", "isActive"],
            Self::Vehicle => &["make", "model", "vehicleType", "driveType", "status", "isActive"],
            Self::Sale => &["vehicle", "paymentMethod"],
            Self::Enquiry => &["status", "vehicle"],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Make => "Make",
            Self::Model => "Model",
            Self::VehicleType => "Vehicle type",
            Self::DriveType => "Drive type",
            Self::Status => "Status",
            Self::Vehicle => "Vehicle",
            Self::Sale => "Sale",
            Self::Enquiry => "Enquiry",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "make" => Ok(Self::Make),
            "model" => Ok(Self::Model),
            "vehicle_type" => Ok(Self::VehicleType),
            "drive_type" => Ok(Self::DriveType),
            "status" => Ok(Self::Status),
            "vehicle" => Ok(Self::Vehicle),
            "sale" => Ok(Self::Sale),
            "enquiry" => Ok(Self::Enquiry),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
