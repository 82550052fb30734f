use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = parse_port(env::var("PORT").ok().as_deref())?;

        Ok(Config {
            database_url,
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(raw: Option<&str>) -> Result<u16, String> {
    raw.unwrap_or("8091")
        .parse()
        .map_err(|_| "PORT must be a valid u16".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_8091() {
        assert_eq!(parse_port(None), Ok(8091));
    }

    #[test]
    fn port_rejects_garbage() {
        assert!(parse_port(Some("eighty")).is_err());
        assert!(parse_port(Some("70000")).is_err());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = Config {
            database_url: "postgres://localhost/ledger".into(),
            host: "127.0.0.1".into(),
            port: 9000,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    }
}
