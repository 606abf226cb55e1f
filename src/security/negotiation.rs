//! Selects which configured schemes challenge a client, from its Accept header.

use std::sync::Arc;

use mime::Mime;

use crate::error::{AuthnError, AuthnResult};
use crate::security::HttpSecurity;

/// Chooses the schemes to challenge for a request.
pub trait SchemeNegotiator: Send + Sync {
    /// Indices of the configured schemes to challenge, in configuration order.
    /// Empty when no scheme can answer the client.
    fn select_handlers(&self, accept: Option<&str>) -> Vec<usize>;
}

/// Negotiates on the content types each scheme's challenge produces.
///
/// The highest quality media range that any scheme can satisfy wins, and
/// every scheme satisfying it is selected. A scheme that declares no content
/// types satisfies every range.
#[derive(Debug, Clone)]
pub struct AcceptNegotiator {
    produced: Vec<Vec<Mime>>,
}

impl AcceptNegotiator {
    /// Build from each scheme's produced content types, in scheme order.
    pub fn new<I, T, S>(schemes: I) -> AuthnResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let produced = schemes
            .into_iter()
            .map(|types| {
                types
                    .into_iter()
                    .map(|t| {
                        t.as_ref().parse::<Mime>().map_err(|e| {
                            AuthnError::Config(format!(
                                "invalid content type '{}': {e}",
                                t.as_ref()
                            ))
                        })
                    })
                    .collect::<AuthnResult<Vec<_>>>()
            })
            .collect::<AuthnResult<Vec<_>>>()?;

        Ok(Self { produced })
    }

    pub fn for_securities(securities: &[Arc<dyn HttpSecurity>]) -> AuthnResult<Self> {
        Self::new(securities.iter().map(|s| s.content_types().to_vec()))
    }

    fn satisfies(&self, scheme: usize, range: &Mime) -> bool {
        let produced = &self.produced[scheme];
        produced.is_empty() || produced.iter().any(|candidate| matches(range, candidate))
    }
}

impl SchemeNegotiator for AcceptNegotiator {
    fn select_handlers(&self, accept: Option<&str>) -> Vec<usize> {
        for range in media_ranges(accept.unwrap_or("*/*")) {
            let selected: Vec<usize> = (0..self.produced.len())
                .filter(|&scheme| self.satisfies(scheme, &range))
                .collect();
            if !selected.is_empty() {
                return selected;
            }
        }
        Vec::new()
    }
}

fn matches(range: &Mime, candidate: &Mime) -> bool {
    (range.type_() == mime::STAR || range.type_() == candidate.type_())
        && (range.subtype() == mime::STAR || range.subtype() == candidate.subtype())
}

fn quality(range: &Mime) -> f32 {
    range
        .get_param("q")
        .and_then(|q| q.as_str().parse::<f32>().ok())
        .unwrap_or(1.0)
}

fn specificity(range: &Mime) -> u8 {
    match (range.type_() == mime::STAR, range.subtype() == mime::STAR) {
        (true, _) => 0,
        (false, true) => 1,
        (false, false) => 2,
    }
}

/// Acceptable media ranges, most preferred first. Unparseable ranges and
/// ranges with `q=0` are dropped.
fn media_ranges(accept: &str) -> Vec<Mime> {
    let accept = if accept.trim().is_empty() {
        "*/*"
    } else {
        accept
    };

    let mut ranges: Vec<(f32, u8, Mime)> = accept
        .split(',')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|range| (quality(&range), specificity(&range), range))
        .filter(|(q, _, _)| *q > 0.0)
        .collect();

    ranges.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
    ranges.into_iter().map(|(_, _, range)| range).collect()
}
