//! DNS record type definitions and conversions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `QueryType` represents the record type requested from the DoH resolver
///
/// Codes outside the set this crate queries are kept as `Unknown` so that
/// answer records of other types (RRSIG in a signed answer, for instance)
/// still decode. An integer converts with `from_num`, back with `to_num`.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
pub enum QueryType {
    Unknown(u16),
    A,     // 1
    Ns,    // 2
    Cname, // 5
    Soa,   // 6
    Mx,    // 15
    Txt,   // 16
    Aaaa,  // 28
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            _ => QueryType::Unknown(num),
        }
    }

    /// Mnemonic used in the `type=` parameter of a DoH JSON request
    pub fn mnemonic(&self) -> String {
        match *self {
            QueryType::A => "A".to_string(),
            QueryType::Ns => "NS".to_string(),
            QueryType::Cname => "CNAME".to_string(),
            QueryType::Soa => "SOA".to_string(),
            QueryType::Mx => "MX".to_string(),
            QueryType::Txt => "TXT".to_string(),
            QueryType::Aaaa => "AAAA".to_string(),
            QueryType::Unknown(x) => format!("TYPE{}", x),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "A" => Ok(QueryType::A),
            "NS" => Ok(QueryType::Ns),
            "CNAME" => Ok(QueryType::Cname),
            "SOA" => Ok(QueryType::Soa),
            "MX" => Ok(QueryType::Mx),
            "TXT" => Ok(QueryType::Txt),
            "AAAA" => Ok(QueryType::Aaaa),
            other => other
                .strip_prefix("TYPE")
                .and_then(|num| num.parse::<u16>().ok())
                .map(QueryType::from_num)
                .ok_or_else(|| format!("unknown record type {:?}", s)),
        }
    }
}
