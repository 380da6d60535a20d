//! HTML pages and static assets served to browsers.

use axum::http::StatusCode;
use bytes::Bytes;

use crate::config::PagesConfig;

const BUILTIN_FORM: &[u8] = include_bytes!("../../assets/form.html");
const BUILTIN_ICON: &[u8] = include_bytes!("../../assets/favicon.png");

/// Upload form and favicon, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Pages {
    pub form: Bytes,
    pub icon: Bytes,
    pub icon_type: String,
}

impl Default for Pages {
    fn default() -> Self {
        Self {
            form: Bytes::from_static(BUILTIN_FORM),
            icon: Bytes::from_static(BUILTIN_ICON),
            icon_type: "image/png".to_string(),
        }
    }
}

impl Pages {
    /// Read configured overrides, falling back to the built-in assets.
    pub fn load(config: &PagesConfig) -> Result<Self, std::io::Error> {
        let defaults = Self::default();

        let form = match config.form_file {
            Some(ref path) => Bytes::from(std::fs::read(path)?),
            None => defaults.form,
        };
        let (icon, icon_type) = match config.icon_file {
            Some(ref path) => (
                Bytes::from(std::fs::read(path)?),
                mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .to_string(),
            ),
            None => (defaults.icon, defaults.icon_type),
        };

        Ok(Self {
            form,
            icon,
            icon_type,
        })
    }
}

/// Page handed back after a successful upload.
pub fn link_page(link: &str) -> String {
    let link = escape_html(link);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Your image</title></head>\n\
         <body>\n<p>Your image is available at:</p>\n<p><a href=\"{link}\">{link}</a></p>\n</body>\n</html>\n"
    )
}

/// Error page showing the status code, its reason phrase and a detail line.
pub fn error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    let text = status.canonical_reason().unwrap_or("Error");
    let message = escape_html(message);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{code} {text}</title></head>\n\
         <body>\n<h1>{code}</h1>\n<h2>{text}</h2>\n<p>{message}</p>\n</body>\n</html>\n"
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
