//! JSON payloads exchanged with the remote service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::frame::{CommandFrame, ResponseFrame};

/// Descriptive fields sent with every card-reading request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestTemplate {
    pub title_list: String,
    pub sale_point: String,
    pub update_card: bool,
    pub command_type: String,
    pub op_inspection: bool,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            title_list: "COMMON_PLUS_SUP".to_owned(),
            sale_point: "010201000005".to_owned(),
            update_card: true,
            command_type: "WRAPPED".to_owned(),
            op_inspection: false,
        }
    }
}

/// A card-reading request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    #[serde(flatten)]
    pub template: RequestTemplate,

    /// Responses to the previous command batch, in command order.
    /// Absent on the first request of a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rapdu: Option<Vec<ResponseFrame>>,
}

impl Request {
    /// The request that opens a run.
    pub fn initial(template: &RequestTemplate) -> Self {
        Self {
            template: template.clone(),
            rapdu: None,
        }
    }

    /// A request carrying the results of a command batch.
    pub fn with_results(template: &RequestTemplate, results: Vec<ResponseFrame>) -> Self {
        Self {
            template: template.clone(),
            rapdu: Some(results),
        }
    }
}

/// A reply from the remote service.
///
/// Only `capdu` is interpreted; every other field is kept as-is for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capdu: Option<Vec<CommandFrame>>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Reply {
    /// Decodes a reply body.
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// The command batch of this reply, empty when none was issued.
    pub fn commands(&self) -> &[CommandFrame] {
        self.capdu.as_deref().unwrap_or_default()
    }

    /// Whether the service has stopped issuing commands.
    pub fn is_final(&self) -> bool {
        self.commands().is_empty()
    }

    /// Looks up a descriptive field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Converts the reply back into a JSON value, `capdu` included if present.
    pub fn into_value(self) -> Value {
        let Self { capdu, mut fields } = self;

        if let Some(capdu) = capdu {
            let capdu = capdu
                .into_iter()
                .map(|frame| Value::String(frame.as_str().to_owned()))
                .collect();
            fields.insert("capdu".to_owned(), Value::Array(capdu));
        }

        Value::Object(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::frame::encode;

    #[test]
    fn test_initial_request() {
        let request = Request::initial(&RequestTemplate::default());

        assert_eq!(
            json!({
                "titleList": "COMMON_PLUS_SUP",
                "salePoint": "010201000005",
                "updateCard": true,
                "commandType": "WRAPPED",
                "opInspection": false,
            }),
            serde_json::to_value(&request).unwrap(),
        );
    }

    #[test]
    fn test_request_with_results() {
        let results = vec![encode(&[0x01], 0x90, 0x00), encode(&[], 0x91, 0xAF)];
        let request = Request::with_results(&RequestTemplate::default(), results);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(json!(["019000", "91AF"]), value["rapdu"]);
        assert_eq!(json!("WRAPPED"), value["commandType"]);
    }

    #[test]
    fn test_template_partial_deserialize() {
        let template: RequestTemplate = serde_json::from_str(r#"{"salePoint":"42"}"#).unwrap();

        assert_eq!("42", template.sale_point);
        assert_eq!("COMMON_PLUS_SUP", template.title_list);
    }

    #[test]
    fn test_reply_with_commands() {
        let reply = Reply::parse(r#"{"capdu":["00A4040000","00B0000000"],"step":1}"#).unwrap();

        assert!(!reply.is_final());
        assert_eq!(2, reply.commands().len());
        assert_eq!("00B0000000", reply.commands()[1].as_str());
        assert_eq!(Some(&json!(1)), reply.get("step"));
    }

    #[test]
    fn test_reply_final() {
        for body in [r#"{"balance":{}}"#, r#"{"capdu":null}"#, r#"{"capdu":[]}"#] {
            let reply = Reply::parse(body).unwrap();
            assert!(reply.is_final(), "{}", body);
        }
    }

    #[test]
    fn test_reply_malformed() {
        assert!(Reply::parse("<html>502 Bad Gateway</html>").is_err());
        assert!(Reply::parse(r#"["00A4040000"]"#).is_err());
        assert!(Reply::parse(r#"{"capdu":[1,2]}"#).is_err());
        assert!(Reply::parse(r#"{"capdu":"00A4040000"}"#).is_err());
    }

    #[test]
    fn test_reply_into_value() {
        let body = json!({
            "capdu": ["00A4040000"],
            "titleList": {"cardName": "Abono"},
        });
        let reply = Reply::parse(&body.to_string()).unwrap();

        assert_eq!(body, reply.into_value());
    }
}
