//! Known multi-label public suffixes
//!
//! The zone cut of a name such as `example.co.uk` sits under the single TLD
//! label `uk`, but registrations happen under `co.uk`. The hierarchy walk
//! records both on the TLD node and starts its candidate list below the pair.

use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    static ref MULTI_LABEL_SUFFIXES: HashSet<&'static str> = {
        let suffixes = [
            // United Kingdom
            "co.uk", "org.uk", "me.uk", "ltd.uk", "plc.uk", "net.uk", "ac.uk", "gov.uk",
            "nhs.uk", "police.uk", "sch.uk",
            // Australia
            "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
            // New Zealand
            "co.nz", "net.nz", "org.nz", "ac.nz", "govt.nz", "geek.nz",
            // Japan
            "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp", "ad.jp", "ed.jp", "gr.jp", "lg.jp",
            // Brazil
            "com.br", "net.br", "org.br", "gov.br", "edu.br",
            // South Africa
            "co.za", "org.za", "gov.za", "ac.za", "net.za", "web.za",
            // China, Hong Kong, Taiwan
            "com.cn", "net.cn", "org.cn", "gov.cn", "edu.cn",
            "com.hk", "org.hk", "net.hk", "edu.hk", "gov.hk",
            "com.tw", "org.tw", "net.tw", "edu.tw", "gov.tw",
            // Korea, India, Singapore
            "co.kr", "or.kr", "ne.kr", "go.kr", "ac.kr",
            "co.in", "net.in", "org.in", "gov.in", "ac.in", "firm.in", "gen.in", "ind.in",
            "com.sg", "net.sg", "org.sg", "edu.sg", "gov.sg",
            // Latin America
            "com.ar", "com.mx", "org.mx", "gob.mx", "com.co", "com.pe", "com.ve", "com.uy",
            // Europe and elsewhere
            "co.il", "org.il", "ac.il", "com.tr", "org.tr", "gov.tr", "com.pl", "com.ua",
            "co.at", "or.at", "com.gr", "com.cy", "com.mt",
            "co.id", "or.id", "com.my", "com.ph", "com.vn", "co.th", "in.th",
            "com.eg", "com.ng", "co.ke", "com.sa", "com.pk",
        ];
        suffixes.iter().copied().collect()
    };
}

/// Whether a two-label name such as `co.uk` is a known public suffix
pub fn is_public_suffix(label_pair: &str) -> bool {
    let normalized = label_pair.trim().trim_end_matches('.').to_ascii_lowercase();
    MULTI_LABEL_SUFFIXES.contains(normalized.as_str())
}

/// The public-suffix pair formed by the two rightmost labels, if known
pub fn public_suffix_of(labels: &[&str]) -> Option<String> {
    if labels.len() < 2 {
        return None;
    }

    let pair = labels[labels.len() - 2..].join(".");
    if is_public_suffix(&pair) {
        Some(pair.to_ascii_lowercase())
    } else {
        None
    }
}
