//! Text rendering of the card information in the final reply.

use std::fmt;

use serde_json::Value;

const MISSING: &str = "N/A";

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => MISSING.to_owned(),
        Some(v) => v.to_string(),
    }
}

/// Card name, balance, group and profiles of a reply, displayed as text.
pub struct Summary<'a>(pub &'a Value);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reply = self.0;
        let balance = |key: &str| text(reply.get("balance").and_then(|b| b.get(key)));

        match reply.pointer("/titleList/cardName") {
            Some(Value::String(name)) => writeln!(f, "{}", name)?,
            _ => writeln!(f, "Unknown Card Name")?,
        }
        writeln!(f)?;

        writeln!(f, "Balance")?;
        writeln!(f, "  Card Serial: {}", balance("desfireSerial"))?;
        writeln!(f, "  Start Contract: {}", balance("initAppDate"))?;
        writeln!(f, "  Expiry: {}", balance("finishAppDate"))?;
        writeln!(f)?;

        writeln!(f, "Group")?;
        writeln!(f, "  Group Name: {}", balance("groupName"))?;
        writeln!(f, "  Group Short Name: {}", balance("groupShortName"))?;
        writeln!(f, "  Group ID: {}", balance("groupId"))?;
        writeln!(f, "  Init Group Date: {}", balance("initGroupDate"))?;
        writeln!(f, "  Finish Group Date: {}", balance("finishGroupDate"))?;
        writeln!(f)?;

        writeln!(f, "Profiles")?;
        let profiles = reply
            .pointer("/balance/profiles")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if profiles.is_empty() {
            writeln!(f, "  No profiles available")?;
        }

        for (i, profile) in profiles.iter().enumerate() {
            writeln!(f, "  Profile {}:", i + 1)?;
            writeln!(f, "    ID: {}", text(profile.get("profileId")))?;
            writeln!(f, "    Name: {}", text(profile.get("profileName")))?;
            writeln!(f, "    Init Date: {}", text(profile.get("initProfileDate")))?;
            writeln!(f, "    Finish Date: {}", text(profile.get("finishProfileDate")))?;
        }

        Ok(())
    }
}
