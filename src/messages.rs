//! Human-readable diagnostics.
//!
//! Messages are looked up by dotted key and rendered with positional `{}`
//! placeholders. They only feed log output; nothing branches on them.

use std::fmt::Display;

/// Renders a diagnostic message for a key.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, key: &str, args: &[&dyn Display]) -> String;
}

type Table = &'static [(&'static str, &'static str)];

const EN: Table = &[
    ("load.start", "loading proxy list from {} with {} workers"),
    ("load.read", "{} proxies read from the list"),
    ("load.estimate", "each worker should test about {} proxies, this should take less than {}"),
    ("healthcheck.start", "checking {} proxies"),
    ("healthcheck.done", "{} valid, {} broken"),
    ("healthcheck.worker_failed", "health-check worker stopped unexpectedly: {}"),
    ("available.summary", "{} ready ({}), {} broken"),
    ("broken.list", "{} broken proxies: {}"),
    ("broken.resubmit", "{} broken proxies resubmitted for checking"),
];

const ES: Table = &[
    ("load.start", "cargando lista de proxies de {} con {} hilos"),
    ("load.read", "{} proxies leídos de la lista"),
    ("load.estimate", "cada hilo debería probar unos {} proxies, esto debería tardar menos de {}"),
    ("healthcheck.start", "probando {} proxies"),
    ("healthcheck.done", "{} válidos, {} rotos"),
    ("healthcheck.worker_failed", "un hilo de verificación se detuvo inesperadamente: {}"),
    ("available.summary", "{} disponibles ({}), {} rotos"),
    ("broken.list", "{} proxies rotos: {}"),
    ("broken.resubmit", "{} proxies rotos reenviados para verificación"),
];

/// Built-in catalog for `en` and `es`. Unknown locales fall back to `en`.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    locale: &'static str,
    table: Table,
}

impl Catalog {
    pub fn for_locale(locale: &str) -> Self {
        let language = locale.split(&['-', '_'][..]).next().unwrap_or_default();
        match language.to_ascii_lowercase().as_str() {
            "es" => Self { locale: "es", table: ES },
            _ => Self { locale: "en", table: EN },
        }
    }

    /// The locale actually in use.
    pub fn locale(&self) -> &'static str {
        self.locale
    }

    fn template(&self, key: &str) -> Option<&'static str> {
        self.table
            .iter()
            .chain(EN.iter())
            .find(|(k, _)| *k == key)
            .map(|(_, template)| *template)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::for_locale("en")
    }
}

impl MessageRenderer for Catalog {
    fn render(&self, key: &str, args: &[&dyn Display]) -> String {
        let Some(template) = self.template(key) else {
            // Unknown keys still produce something readable.
            let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            return format!("{key} {}", rendered.join(" ")).trim_end().to_string();
        };

        let mut out = String::with_capacity(template.len());
        let mut args = args.iter();
        let mut pieces = template.split("{}").peekable();
        while let Some(piece) = pieces.next() {
            out.push_str(piece);
            if pieces.peek().is_some() {
                match args.next() {
                    Some(arg) => out.push_str(&arg.to_string()),
                    None => out.push_str("{}"),
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_english() {
        let catalog = Catalog::default();
        assert_eq!(catalog.render("healthcheck.done", &[&3, &2]), "3 valid, 2 broken");
    }

    #[test]
    fn test_render_spanish_and_region_tags() {
        let catalog = Catalog::for_locale("es-AR");
        assert_eq!(catalog.locale(), "es");
        assert_eq!(catalog.render("healthcheck.done", &[&3, &2]), "3 válidos, 2 rotos");
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        assert_eq!(Catalog::for_locale("fr").locale(), "en");
    }

    #[test]
    fn test_missing_args_and_unknown_keys() {
        let catalog = Catalog::default();
        assert_eq!(catalog.render("healthcheck.done", &[&1]), "1 valid, {} broken");
        assert_eq!(catalog.render("no.such.key", &[&"x"]), "no.such.key x");
    }
}
