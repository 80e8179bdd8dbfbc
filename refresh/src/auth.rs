use crate::RefreshError;
use fsimage_exporter_config::Config;
use std::path::PathBuf;

/// Kerberos principal plus keytab configured for a secured NameNode.
///
/// Only validated. Image downloads do not authenticate with them, so a NameNode that demands
/// SPNEGO rejects every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosCredentials {
    pub principal: String,
    pub keytab: PathBuf,
}

impl KerberosCredentials {
    /// `Ok(None)` when no credentials are configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, RefreshError> {
        match (&config.principal, &config.keytab_path) {
            (None, None) => Ok(None),
            (Some(principal), Some(keytab)) => {
                if !keytab.is_file() {
                    return Err(RefreshError::invalid_configuration(format!(
                        "keytab {} does not exist",
                        keytab.display()
                    )));
                }
                warn!(
                    principal = %principal,
                    "kerberos credentials are configured but secured NameNodes are not supported, downloads stay unauthenticated"
                );
                Ok(Some(Self {
                    principal: principal.clone(),
                    keytab: keytab.clone(),
                }))
            }
            _ => Err(RefreshError::invalid_configuration(
                "principal and keytab_path must be configured together",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    fn config(principal: Option<&str>, keytab: Option<PathBuf>) -> Config {
        Config {
            principal: principal.map(str::to_string),
            keytab_path: keytab,
            ..Default::default()
        }
    }

    #[test]
    fn credentials_are_optional_but_paired() {
        assert_eq!(KerberosCredentials::from_config(&config(None, None)).unwrap(), None);
        assert!(matches!(
            KerberosCredentials::from_config(&config(Some("exporter@EXAMPLE.COM"), None)),
            Err(RefreshError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn keytab_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = config(Some("exporter@EXAMPLE.COM"), Some(dir.child("exporter.keytab")));
        assert!(matches!(
            KerberosCredentials::from_config(&missing),
            Err(RefreshError::InvalidConfiguration(_))
        ));

        std::fs::write(dir.child("exporter.keytab"), "").unwrap();
        let present = config(Some("exporter@EXAMPLE.COM"), Some(dir.child("exporter.keytab")));
        let credentials = KerberosCredentials::from_config(&present).unwrap().unwrap();
        assert_eq!(credentials.principal, "exporter@EXAMPLE.COM");
    }
}
