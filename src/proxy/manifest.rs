use url::Url;

use crate::net::ProxyRequest;

/// Ordered list of assets that must be in the static store after install.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
  entries: Vec<ProxyRequest>,
}

impl Manifest {
  /// Resolve manifest entries against the static origin.
  ///
  /// Entries may be absolute URLs or origin-relative paths. Duplicates (after
  /// normalization) are dropped, keeping the first occurrence.
  pub fn resolve(origin: &Url, entries: &[String]) -> Result<Self, url::ParseError> {
    let mut resolved: Vec<ProxyRequest> = Vec::with_capacity(entries.len());
    for entry in entries {
      let request = ProxyRequest::get(origin.join(entry)?);
      if !resolved.iter().any(|r| r.key() == request.key()) {
        resolved.push(request);
      }
    }
    Ok(Self { entries: resolved })
  }

  pub fn entries(&self) -> &[ProxyRequest] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
