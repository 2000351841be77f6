use serde::Deserialize;

use crate::apis::vbout::ContactRecord;

/// The only event type the relay forwards
pub const FORM_SUBMISSION_EVENT: &str = "prechat:formsubmission";

/// The webhook body the chat widget sends when a visitor submits the
/// prechat form
#[derive(Debug, Deserialize)]
pub struct FormSubmission {
    pub event: String,
    #[serde(default)]
    pub visitor_id: String,
    #[serde(default)]
    pub property_url: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl FormSubmission {
    /// Case-insensitive lookup of a form field by name. Missing fields
    /// resolve to an empty string.
    pub fn field(&self, name: &str) -> String {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.clone())
            .unwrap_or_default()
    }

    /// Build the CRM contact from the submitted fields. Returns `None` when
    /// the email field is empty or absent; no contact exists without one.
    pub fn contact(&self) -> Option<ContactRecord> {
        let email = self.field("Email");
        if email.is_empty() {
            return None;
        }

        Some(ContactRecord {
            email,
            phone: self.field("Phone Number"),
            country: self.field("Country"),
            visitor_id: self.visitor_id.clone(),
            property_url: self.property_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(fields: &[(&str, &str)]) -> FormSubmission {
        FormSubmission {
            event: FORM_SUBMISSION_EVENT.to_string(),
            visitor_id: "v-1".to_string(),
            property_url: "https://example.com".to_string(),
            fields: fields
                .iter()
                .map(|(name, value)| FormField {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_contact_round_trip() {
        let contact = submission(&[("Email", "a@b.com"), ("Phone Number", "555")])
            .contact()
            .unwrap();

        assert_eq!(contact.email, "a@b.com");
        assert_eq!(contact.phone, "555");
        assert_eq!(contact.country, "");
        assert_eq!(contact.visitor_id, "v-1");
        assert_eq!(contact.property_url, "https://example.com");
    }

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        for name in ["Email", "email", "EMAIL"] {
            let contact = submission(&[(name, "a@b.com")]).contact().unwrap();
            assert_eq!(contact.email, "a@b.com");
        }
    }

    #[test]
    fn test_no_contact_without_email() {
        assert!(submission(&[("Phone Number", "555")]).contact().is_none());
        assert!(submission(&[("Email", "")]).contact().is_none());
        assert!(submission(&[]).contact().is_none());
    }

    #[test]
    fn test_body_parses_with_missing_optional_keys() {
        let submission: FormSubmission = serde_json::from_str(
            r#"{"event": "prechat:formsubmission", "fields": [{"name": "Email", "value": "a@b.com"}]}"#,
        )
        .unwrap();

        assert_eq!(submission.visitor_id, "");
        assert_eq!(submission.property_url, "");
        let contact = submission.contact().unwrap();
        assert_eq!(contact.email, "a@b.com");
    }
}
