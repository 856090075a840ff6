use std::fmt;

/// Major API versions served under `/v{N}`. Only the shape of the
/// prediction payload differs between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub const ALL: [ApiVersion; 2] = [ApiVersion::V1, ApiVersion::V2];
    pub const LATEST: ApiVersion = ApiVersion::V2;

    pub fn major(self) -> u8 {
        match self {
            ApiVersion::V1 => 1,
            ApiVersion::V2 => 2,
        }
    }

    /// Cache key namespace, e.g. `v1`.
    pub fn namespace(self) -> String {
        format!("v{}", self.major())
    }

    /// Route prefix, e.g. `/v1`.
    pub fn prefix(self) -> String {
        format!("/v{}", self.major())
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major())
    }
}
