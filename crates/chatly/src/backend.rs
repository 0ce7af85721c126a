//! Decides which completion backend a send should use based on the shape of
//! the caller's credential string.

/// Hosted-provider secret keys start with this prefix.
pub const SECRET_KEY_PREFIX: &str = "sk-";

/// The backend a request resolves to. Selection is total: every combination
/// of credential and server default maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionBackend {
    /// Hosted provider, called with this key.
    Hosted { api_key: String },
    /// User-supplied HTTP(S) endpoint that accepts the full request payload.
    External { endpoint: String },
    /// No usable credential anywhere. Callers must reject before any network
    /// activity happens.
    Unconfigured,
}

impl CompletionBackend {
    /// Resolves a credential string against the server's default key.
    ///
    /// Order matters: a literal secret key always wins, then the server
    /// default covers anything that is not an endpoint URL, and only then is
    /// the credential treated as an endpoint.
    pub fn select(credential: Option<&str>, server_default_key: Option<&str>) -> Self {
        let credential = credential.map(str::trim).filter(|c| !c.is_empty());

        if let Some(cred) = credential {
            if cred.starts_with(SECRET_KEY_PREFIX) {
                return CompletionBackend::Hosted {
                    api_key: cred.to_string(),
                };
            }
        }

        if let Some(key) = server_default_key {
            if !credential.is_some_and(is_http_url) {
                return CompletionBackend::Hosted {
                    api_key: key.to_string(),
                };
            }
        }

        if let Some(cred) = credential {
            if is_http_url(cred) {
                return CompletionBackend::External {
                    endpoint: cred.to_string(),
                };
            }
        }

        CompletionBackend::Unconfigured
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_credential_selects_hosted_with_that_key() {
        let backend = CompletionBackend::select(Some("sk-user"), Some("sk-server"));
        assert_eq!(
            backend,
            CompletionBackend::Hosted {
                api_key: "sk-user".into()
            }
        );
    }

    #[test]
    fn server_default_covers_missing_or_junk_credentials() {
        for cred in [None, Some(""), Some("   "), Some("not-a-key")] {
            let backend = CompletionBackend::select(cred, Some("sk-server"));
            assert_eq!(
                backend,
                CompletionBackend::Hosted {
                    api_key: "sk-server".into()
                },
                "credential {:?}",
                cred
            );
        }
    }

    #[test]
    fn url_credential_selects_external_even_with_server_default() {
        let backend =
            CompletionBackend::select(Some("https://my.box/api"), Some("sk-server"));
        assert_eq!(
            backend,
            CompletionBackend::External {
                endpoint: "https://my.box/api".into()
            }
        );

        let backend = CompletionBackend::select(Some("http://localhost:8080/ask"), None);
        assert_eq!(
            backend,
            CompletionBackend::External {
                endpoint: "http://localhost:8080/ask".into()
            }
        );
    }

    #[test]
    fn nothing_usable_is_unconfigured() {
        assert_eq!(
            CompletionBackend::select(None, None),
            CompletionBackend::Unconfigured
        );
        assert_eq!(
            CompletionBackend::select(Some("junk"), None),
            CompletionBackend::Unconfigured
        );
        assert_eq!(
            CompletionBackend::select(Some("ftp://elsewhere"), None),
            CompletionBackend::Unconfigured
        );
    }

    #[test]
    fn credential_whitespace_is_trimmed_before_matching() {
        let backend = CompletionBackend::select(Some("  sk-abc  "), None);
        assert_eq!(
            backend,
            CompletionBackend::Hosted {
                api_key: "sk-abc".into()
            }
        );
    }
}
