//! On-disk format of Allure result files (`<uuid>-result.json`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllureStatus {
	Passed,
	Failed,
	Broken,
	Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllureStage {
	Running,
	Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllureLabel {
	pub name: String,
	pub value: String,
}

impl AllureLabel {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllureAttachment {
	pub name: String,
	/// File name relative to the results directory.
	pub source: String,
	#[serde(rename = "type")]
	pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureResult {
	pub uuid: String,
	pub history_id: String,
	pub name: String,
	pub full_name: String,
	pub status: AllureStatus,
	#[serde(default)]
	pub status_details: StatusDetails,
	pub stage: AllureStage,
	/// Milliseconds since the Unix epoch.
	pub start: i64,
	pub stop: i64,
	#[serde(default)]
	pub labels: Vec<AllureLabel>,
	#[serde(default)]
	pub attachments: Vec<AllureAttachment>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn result_uses_allure_field_names() {
		let result = AllureResult {
			uuid: "u".into(),
			history_id: "h".into(),
			name: "login".into(),
			full_name: "suite::login".into(),
			status: AllureStatus::Failed,
			status_details: StatusDetails {
				message: Some("boom".into()),
				trace: None,
			},
			stage: AllureStage::Finished,
			start: 1,
			stop: 2,
			labels: vec![AllureLabel::new("thread", "gw0")],
			attachments: vec![AllureAttachment {
				name: "Failed_Screenshot_login".into(),
				source: "a-attachment.png".into(),
				mime_type: "image/png".into(),
			}],
		};
		let json = serde_json::to_value(&result).unwrap();
		assert_eq!(json["historyId"], "h");
		assert_eq!(json["fullName"], "suite::login");
		assert_eq!(json["status"], "failed");
		assert_eq!(json["statusDetails"]["message"], "boom");
		assert!(json["statusDetails"].get("trace").is_none());
		assert_eq!(json["attachments"][0]["type"], "image/png");
	}
}
