use std::fmt;
use std::str::FromStr;

/// The marketplace a tenant binds to. Carried as an enum rather than the
/// source's bare strings, but still written to/from the storage layer as a
/// string for gateway compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Vendor {
    Intent,
    TikTok,
    Lazada,
    Shopee,
    OpenCart,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Intent => "INTENT",
            Vendor::TikTok => "TIKTOK",
            Vendor::Lazada => "LAZADA",
            Vendor::Shopee => "SHOPEE",
            Vendor::OpenCart => "OPENCART",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported vendor {0:?}")]
pub struct UnknownVendor(pub String);

impl FromStr for Vendor {
    type Err = UnknownVendor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTENT" => Ok(Vendor::Intent),
            "TIKTOK" => Ok(Vendor::TikTok),
            "LAZADA" => Ok(Vendor::Lazada),
            "SHOPEE" => Ok(Vendor::Shopee),
            "OPENCART" => Ok(Vendor::OpenCart),
            other => Err(UnknownVendor(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for vendor in [Vendor::Intent, Vendor::TikTok, Vendor::Lazada, Vendor::Shopee, Vendor::OpenCart] {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
    }

    #[test]
    fn rejects_unknown_vendor() {
        assert!("BOGUS".parse::<Vendor>().is_err());
    }
}
