//! Regional dishes for each accent region.

static CUISINE_MAP: [(&str, [&str; 3]); 6] = [
    ("andhra_pradesh", ["Pulihora", "Gongura Pachadi", "Pesarattu"]),
    ("tamil_nadu", ["Idli", "Sambar", "Pongal"]),
    ("karnataka", ["Bisi Bele Bath", "Ragi Mudde", "Mysore Pak"]),
    ("kerala", ["Appam", "Avial", "Puttu"]),
    ("jharkhand", ["Thekua", "Chilka Roti", "Handia"]),
    ("gujrat", ["Dhokla", "Undhiyu", "Khandvi"]),
];

/// `"Tamil Nadu"` and `"tamil_nadu"` name the same region.
pub fn normalize_region(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

pub fn lookup(accent: &str) -> Option<&'static [&'static str]> {
    let region = normalize_region(accent);
    CUISINE_MAP
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, dishes)| dishes.as_slice())
}
