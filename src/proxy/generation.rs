/// Logical role of a cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
  /// Assets seeded from the manifest at install time
  Static,
  /// Reference-data API responses cached on first fetch
  Api,
}

impl StoreRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      StoreRole::Static => "static",
      StoreRole::Api => "api",
    }
  }
}

/// A deployment generation. Namespaces the stores and decides which of them
/// survive a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
  app: String,
  version: u32,
}

impl Generation {
  pub fn new(app: impl Into<String>, version: u32) -> Self {
    Self {
      app: app.into(),
      version,
    }
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  /// Store name for a role, e.g. `pokemon-database-api-v3`.
  pub fn store_name(&self, role: StoreRole) -> String {
    format!("{}-{}-v{}", self.app, role.as_str(), self.version)
  }

  pub fn static_store(&self) -> String {
    self.store_name(StoreRole::Static)
  }

  pub fn api_store(&self) -> String {
    self.store_name(StoreRole::Api)
  }

  /// Whether a store name belongs to this generation.
  pub fn owns(&self, name: &str) -> bool {
    name == self.static_store() || name == self.api_store()
  }
}

impl std::fmt::Display for Generation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} v{}", self.app, self.version)
  }
}
