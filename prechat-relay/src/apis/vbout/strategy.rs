use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use std::collections::HashMap;

/// HTTP verb used for the outbound call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
}

/// Where the contact parameters (and a `parameter` placed key) are encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Query string on the request URL
    Query,
    /// application/x-www-form-urlencoded body
    Form,
    /// JSON body
    Json,
}

/// Where the API key is placed on the outbound call
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "placement", rename_all = "lowercase")]
pub enum AuthPlacement {
    /// The key rides alongside the contact parameters under the given name,
    /// wherever the encoding puts them
    Parameter { parameter: String },
    /// Authorization: Bearer header
    Bearer,
    /// X-API-Key header
    Header,
}

/// One way of encoding and authenticating the outbound CRM call. The real
/// endpoint contract is not documented anywhere we have found, so these are
/// tried in configuration order until one reports success.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TransportStrategy {
    pub verb: Verb,
    pub encoding: Encoding,
    pub auth: AuthPlacement,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Get => write!(f, "GET"),
            Verb::Post => write!(f, "POST"),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Query => write!(f, "query-string"),
            Encoding::Form => write!(f, "form-urlencoded"),
            Encoding::Json => write!(f, "json"),
        }
    }
}

impl std::fmt::Display for AuthPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPlacement::Parameter { parameter } => write!(f, "parameter [{parameter}]"),
            AuthPlacement::Bearer => write!(f, "bearer header"),
            AuthPlacement::Header => write!(f, "x-api-key header"),
        }
    }
}

impl std::fmt::Display for TransportStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} with {}", self.verb, self.encoding, self.auth)
    }
}

impl TransportStrategy {
    /// Check that the verb and encoding can be combined. A GET cannot carry
    /// a form or JSON body.
    pub fn validate(&self) -> Result<(), String> {
        match (self.verb, self.encoding) {
            (Verb::Get, Encoding::Form) | (Verb::Get, Encoding::Json) => Err(format!(
                "a GET request cannot carry a {} body",
                self.encoding
            )),
            _ => Ok(()),
        }
    }

    /// Build the outbound request this strategy describes. `params` is the
    /// contact parameter map; a `parameter` placed key is merged into it so
    /// it travels with the same encoding.
    pub fn build_request(
        &self,
        client: &Client,
        url: &str,
        api_key: &str,
        params: &HashMap<String, String>,
    ) -> RequestBuilder {
        let mut params = params.clone();
        if let AuthPlacement::Parameter { parameter } = &self.auth {
            params.insert(parameter.clone(), api_key.to_string());
        }

        let builder = match self.verb {
            Verb::Get => client.get(url),
            Verb::Post => client.post(url),
        };

        let builder = match self.encoding {
            Encoding::Query => builder.query(&params),
            Encoding::Form => builder.form(&params),
            Encoding::Json => builder.json(&params),
        };

        match &self.auth {
            AuthPlacement::Parameter { .. } => builder,
            AuthPlacement::Bearer => builder.header("Authorization", format!("Bearer {api_key}")),
            AuthPlacement::Header => builder.header("X-API-Key", api_key),
        }
    }
}

/// The default priority order, mirroring what has been observed to matter
/// empirically: form-encoded `apikey` first, then JSON with a bearer header,
/// then the `api_key` spelling, then a plain GET.
pub fn default_strategies() -> Vec<TransportStrategy> {
    vec![
        TransportStrategy {
            verb: Verb::Post,
            encoding: Encoding::Form,
            auth: AuthPlacement::Parameter {
                parameter: "apikey".to_string(),
            },
        },
        TransportStrategy {
            verb: Verb::Post,
            encoding: Encoding::Json,
            auth: AuthPlacement::Bearer,
        },
        TransportStrategy {
            verb: Verb::Post,
            encoding: Encoding::Form,
            auth: AuthPlacement::Parameter {
                parameter: "api_key".to_string(),
            },
        },
        TransportStrategy {
            verb: Verb::Get,
            encoding: Encoding::Query,
            auth: AuthPlacement::Parameter {
                parameter: "apikey".to_string(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_strategy_from_toml() {
        let strategy: TransportStrategy = toml::from_str(
            r#"
            verb = "post"
            encoding = "form"
            auth = { placement = "parameter", parameter = "apikey" }
            "#,
        )
        .unwrap();

        assert_eq!(strategy.verb, Verb::Post);
        assert_eq!(strategy.encoding, Encoding::Form);
        assert_eq!(
            strategy.auth,
            AuthPlacement::Parameter {
                parameter: "apikey".to_string()
            }
        );
    }

    #[test]
    fn test_parse_header_placements_from_toml() {
        let bearer: TransportStrategy = toml::from_str(
            r#"
            verb = "post"
            encoding = "json"
            auth = { placement = "bearer" }
            "#,
        )
        .unwrap();
        assert_eq!(bearer.auth, AuthPlacement::Bearer);

        let header: TransportStrategy = toml::from_str(
            r#"
            verb = "post"
            encoding = "json"
            auth = { placement = "header" }
            "#,
        )
        .unwrap();
        assert_eq!(header.auth, AuthPlacement::Header);
    }

    #[test]
    fn test_get_cannot_carry_a_body() {
        for encoding in [Encoding::Form, Encoding::Json] {
            let strategy = TransportStrategy {
                verb: Verb::Get,
                encoding,
                auth: AuthPlacement::Bearer,
            };
            assert!(strategy.validate().is_err());
        }

        let strategy = TransportStrategy {
            verb: Verb::Get,
            encoding: Encoding::Query,
            auth: AuthPlacement::Bearer,
        };
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_default_strategy_order() {
        let strategies = default_strategies();
        assert_eq!(strategies.len(), 4);
        assert_eq!(
            strategies[0].to_string(),
            "POST form-urlencoded with parameter [apikey]"
        );
        assert_eq!(strategies[1].to_string(), "POST json with bearer header");
        assert_eq!(
            strategies[2].to_string(),
            "POST form-urlencoded with parameter [api_key]"
        );
        assert_eq!(
            strategies[3].to_string(),
            "GET query-string with parameter [apikey]"
        );
        for strategy in strategies {
            assert!(strategy.validate().is_ok());
        }
    }

    #[test]
    fn test_form_request_places_key_in_body() {
        let client = Client::new();
        let strategy = &default_strategies()[0];
        let request = strategy
            .build_request(
                &client,
                "http://127.0.0.1:9/addcontact",
                "secret-key",
                &params(&[("email", "a@b.com")]),
            )
            .build()
            .unwrap();

        assert_eq!(request.method(), "POST");
        assert!(request.url().query().is_none());
        let body = String::from_utf8(request.body().unwrap().as_bytes().unwrap().to_vec()).unwrap();
        assert!(body.contains("apikey=secret-key"));
        assert!(body.contains("email=a%40b.com"));
    }

    #[test]
    fn test_bearer_request_places_key_in_header() {
        let client = Client::new();
        let strategy = &default_strategies()[1];
        let request = strategy
            .build_request(
                &client,
                "http://127.0.0.1:9/addcontact",
                "secret-key",
                &params(&[("email", "a@b.com")]),
            )
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer secret-key"
        );
        let body = String::from_utf8(request.body().unwrap().as_bytes().unwrap().to_vec()).unwrap();
        assert!(body.contains("\"email\":\"a@b.com\""));
        assert!(!body.contains("secret-key"));
    }

    #[test]
    fn test_get_request_places_key_on_url() {
        let client = Client::new();
        let strategy = &default_strategies()[3];
        let request = strategy
            .build_request(
                &client,
                "http://127.0.0.1:9/addcontact",
                "secret-key",
                &params(&[("email", "a@b.com")]),
            )
            .build()
            .unwrap();

        assert_eq!(request.method(), "GET");
        let query = request.url().query().unwrap();
        assert!(query.contains("apikey=secret-key"));
        assert!(query.contains("email=a%40b.com"));
        assert!(request.body().is_none());
    }
}
