use crate::core::config::data::Config;
use crate::core::config::defaults::{DEFAULT_LISTEN, DEFAULT_RELAY_URL};

impl Config {
    /// Effective settings, marking which ones come from defaults.
    pub fn describe(&self, relay_url: &str) -> String {
        fn line(key: &str, value: &str, explicit: bool) -> String {
            if explicit {
                format!("  {key}: {value}\n")
            } else {
                format!("  {key}: {value} (default)\n")
            }
        }

        let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let mut out = String::from("Current configuration:\n");
        out.push_str(&line(
            "relay_url",
            relay_url,
            self.relay_url.is_some() || relay_url != DEFAULT_RELAY_URL,
        ));
        out.push_str(&line(
            "default_mode",
            self.mode().as_str(),
            self.default_mode.is_some(),
        ));
        out.push_str(&line("listen", listen, self.listen.is_some()));
        out.push_str(&line(
            "gateway_url",
            self.gateway_url(),
            self.gateway_url.is_some(),
        ));
        out.push_str(&line("model", self.model(), self.model.is_some()));
        out.push_str(&line(
            "model_label",
            self.model_label(),
            self.model_label.is_some(),
        ));
        out
    }

    pub fn print_all(&self) {
        print!("{}", self.describe(&self.relay_url()));
    }
}
