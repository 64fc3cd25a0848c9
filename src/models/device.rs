use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::RiskLevel;
use crate::error::{AppError, Result};
use crate::keywords::parse_keyword_list;

/// The six device-safety record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    Device510K,
    Recall,
    Event,
    Registration,
    Guidance,
    CustomsCase,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 6] = [
        DeviceKind::Device510K,
        DeviceKind::Recall,
        DeviceKind::Event,
        DeviceKind::Registration,
        DeviceKind::Guidance,
        DeviceKind::CustomsCase,
    ];

    /// Name used in the `kind` column and the display `dataType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Device510K => "Device510K",
            DeviceKind::Recall => "DeviceRecallRecord",
            DeviceKind::Event => "DeviceEventReport",
            DeviceKind::Registration => "DeviceRegistrationRecord",
            DeviceKind::Guidance => "GuidanceDocument",
            DeviceKind::CustomsCase => "CustomsCase",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the short tokens and full kind names, case-insensitively.
impl FromStr for DeviceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "510k" | "device510k" => Ok(DeviceKind::Device510K),
            "recall" | "devicerecallrecord" => Ok(DeviceKind::Recall),
            "event" | "deviceeventreport" => Ok(DeviceKind::Event),
            "registration" | "deviceregistrationrecord" => Ok(DeviceKind::Registration),
            "guidance" | "guidancedocument" => Ok(DeviceKind::Guidance),
            "customs" | "customscase" => Ok(DeviceKind::CustomsCase),
            other => Err(AppError::InvalidInput(format!("unsupported data type: {other}"))),
        }
    }
}

/// Kind-specific fields of one device record.
pub trait DeviceFields {
    fn kind(&self) -> DeviceKind;

    /// Named domain fields in display order.
    fn fields(&self) -> Vec<(&'static str, Option<&str>)>;
}

macro_rules! device_struct {
    ($name:ident, $kind:expr, { $($field:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $(pub $field: Option<String>,)+
        }

        impl DeviceFields for $name {
            fn kind(&self) -> DeviceKind {
                $kind
            }

            fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
                vec![$(($label, self.$field.as_deref()),)+]
            }
        }
    };
}

device_struct!(Device510K, DeviceKind::Device510K, {
    device_name => "deviceName",
    applicant => "applicant",
    date_received => "dateReceived",
    device_class => "deviceClass",
    trade_name => "tradeName",
    k_number => "kNumber",
});

device_struct!(DeviceRecall, DeviceKind::Recall, {
    recalling_firm => "recallingFirm",
    event_date_posted => "eventDatePosted",
    product_description => "productDescription",
    recall_status => "recallStatus",
});

device_struct!(DeviceEvent, DeviceKind::Event, {
    brand_name => "brandName",
    manufacturer_name => "manufacturerName",
    generic_name => "genericName",
    date_of_event => "dateOfEvent",
    date_received => "dateReceived",
});

device_struct!(DeviceRegistration, DeviceKind::Registration, {
    device_name => "deviceName",
    manufacturer_name => "manufacturerName",
    registration_number => "registrationNumber",
    device_class => "deviceClass",
    proprietary_name => "proprietaryName",
    fei_number => "feiNumber",
});

device_struct!(GuidanceDocument, DeviceKind::Guidance, {
    title => "title",
    topic => "topic",
    publication_date => "publicationDate",
    guidance_status => "guidanceStatus",
});

device_struct!(CustomsCase, DeviceKind::CustomsCase, {
    case_number => "caseNumber",
    ruling_result => "rulingResult",
    hs_code_used => "hsCodeUsed",
    case_date => "caseDate",
    violation_type => "violationType",
    penalty_amount => "penaltyAmount",
});

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceDetail {
    Device510K(Device510K),
    Recall(DeviceRecall),
    Event(DeviceEvent),
    Registration(DeviceRegistration),
    Guidance(GuidanceDocument),
    CustomsCase(CustomsCase),
}

impl DeviceDetail {
    fn inner(&self) -> &dyn DeviceFields {
        match self {
            DeviceDetail::Device510K(d) => d,
            DeviceDetail::Recall(d) => d,
            DeviceDetail::Event(d) => d,
            DeviceDetail::Registration(d) => d,
            DeviceDetail::Guidance(d) => d,
            DeviceDetail::CustomsCase(d) => d,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            DeviceDetail::Device510K(d) => serde_json::to_string(d)?,
            DeviceDetail::Recall(d) => serde_json::to_string(d)?,
            DeviceDetail::Event(d) => serde_json::to_string(d)?,
            DeviceDetail::Registration(d) => serde_json::to_string(d)?,
            DeviceDetail::Guidance(d) => serde_json::to_string(d)?,
            DeviceDetail::CustomsCase(d) => serde_json::to_string(d)?,
        };
        Ok(json)
    }

    pub fn from_json(kind: DeviceKind, json: &str) -> Result<Self> {
        let detail = match kind {
            DeviceKind::Device510K => DeviceDetail::Device510K(serde_json::from_str(json)?),
            DeviceKind::Recall => DeviceDetail::Recall(serde_json::from_str(json)?),
            DeviceKind::Event => DeviceDetail::Event(serde_json::from_str(json)?),
            DeviceKind::Registration => DeviceDetail::Registration(serde_json::from_str(json)?),
            DeviceKind::Guidance => DeviceDetail::Guidance(serde_json::from_str(json)?),
            DeviceKind::CustomsCase => DeviceDetail::CustomsCase(serde_json::from_str(json)?),
        };
        Ok(detail)
    }
}

impl DeviceFields for DeviceDetail {
    fn kind(&self) -> DeviceKind {
        self.inner().kind()
    }

    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        self.inner().fields()
    }
}

/// Columns shared by every device kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMeta {
    pub id: i64,
    pub natural_key: String,
    pub risk_level: RiskLevel,
    /// JSON array or comma-separated list, as scraped.
    pub keywords: Option<String>,
    pub jd_country: Option<String>,
    pub data_source: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub meta: DeviceMeta,
    pub detail: DeviceDetail,
}

/// Common capability of every device record kind.
pub trait RiskRated {
    fn risk_level(&self) -> RiskLevel;
    fn set_risk_level(&mut self, level: RiskLevel);
    fn to_display(&self) -> DisplayRecord;
}

impl RiskRated for DeviceRecord {
    fn risk_level(&self) -> RiskLevel {
        self.meta.risk_level
    }

    fn set_risk_level(&mut self, level: RiskLevel) {
        self.meta.risk_level = level;
    }

    fn to_display(&self) -> DisplayRecord {
        let mut fields = BTreeMap::new();
        let mut matched_fields = Vec::new();
        for (name, value) in self.detail.fields() {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                matched_fields.push(name.to_string());
                fields.insert(name.to_string(), Some(v.to_string()));
            } else {
                fields.insert(name.to_string(), None);
            }
        }

        DisplayRecord {
            id: self.meta.id,
            fields,
            risk_level: self.meta.risk_level,
            data_type: self.detail.kind().as_str().to_string(),
            keywords: self.meta.keywords.clone(),
            matched_keywords: parse_keyword_list(self.meta.keywords.as_deref()),
            matched_fields,
            remarks: self.meta.remark.clone(),
        }
    }
}

/// Uniform display shape shared by all device kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Option<String>>,
    pub risk_level: RiskLevel,
    pub data_type: String,
    pub keywords: Option<String>,
    pub matched_keywords: Vec<String>,
    pub matched_fields: Vec<String>,
    pub remarks: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tokens_accept_synonyms() {
        assert_eq!("510k".parse::<DeviceKind>().unwrap(), DeviceKind::Device510K);
        assert_eq!("Device510K".parse::<DeviceKind>().unwrap(), DeviceKind::Device510K);
        assert_eq!("RECALL".parse::<DeviceKind>().unwrap(), DeviceKind::Recall);
        assert_eq!("deviceEventReport".parse::<DeviceKind>().unwrap(), DeviceKind::Event);
        assert_eq!("customs".parse::<DeviceKind>().unwrap(), DeviceKind::CustomsCase);
        assert!("toaster".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn display_lists_only_populated_fields_as_matched() {
        let record = DeviceRecord {
            meta: DeviceMeta {
                id: 7,
                natural_key: "K240001".into(),
                risk_level: RiskLevel::High,
                keywords: Some(r#"["wireless","FCC"]"#.into()),
                jd_country: Some("美国".into()),
                data_source: Some("FDA".into()),
                remark: None,
            },
            detail: DeviceDetail::Device510K(Device510K {
                device_name: Some("Pulse oximeter".into()),
                k_number: Some("K240001".into()),
                applicant: Some("  ".into()),
                ..Default::default()
            }),
        };

        let display = record.to_display();
        assert_eq!(display.data_type, "Device510K");
        assert_eq!(display.matched_fields, vec!["deviceName", "kNumber"]);
        assert_eq!(display.matched_keywords, vec!["wireless", "FCC"]);
        assert_eq!(display.fields.len(), 6);
        assert_eq!(display.fields["applicant"], None);
    }

    #[test]
    fn detail_json_round_trips_by_kind() {
        let detail = DeviceDetail::Recall(DeviceRecall {
            recalling_firm: Some("Acme Medical".into()),
            ..Default::default()
        });
        let json = detail.to_json().unwrap();
        assert!(json.contains("recallingFirm"));
        assert_eq!(DeviceDetail::from_json(DeviceKind::Recall, &json).unwrap(), detail);
    }
}
