//! Fixed lane sets, category table and filter-to-tag rules

use super::models::ListingFilters;

/// Tag of the general "hot" listing
pub const HOT_TAG: &str = "热门";

/// One upstream listing query feeding a named lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub tag: &'static str,
}

const fn lane(name: &'static str, kind: &'static str, tag: &'static str) -> LaneSpec {
    LaneSpec { name, kind, tag }
}

const MOVIE_LANES: [LaneSpec; 8] = [
    lane("热门电影", "movie", "热门"),
    lane("豆瓣高分", "movie", "豆瓣高分"),
    lane("动作片", "movie", "动作"),
    lane("喜剧片", "movie", "喜剧"),
    lane("科幻片", "movie", "科幻"),
    lane("惊悚片", "movie", "惊悚"),
    lane("爱情片", "movie", "爱情"),
    lane("动画电影", "movie", "动画"),
];

const TV_LANES: [LaneSpec; 8] = [
    lane("热门剧集", "tv", "热门"),
    lane("国产剧", "tv", "国产剧"),
    lane("美剧", "tv", "美剧"),
    lane("日剧", "tv", "日剧"),
    lane("韩剧", "tv", "韩剧"),
    lane("英剧", "tv", "英剧"),
    lane("综艺节目", "tv", "综艺"),
    lane("日本动画", "tv", "日本动画"),
];

const LATEST_LANES: [LaneSpec; 6] = [
    lane("院线新片", "", "院线新片"),
    lane("最新电影", "", "最新"),
    lane("即将上映", "", "即将上映"),
    lane("新剧上线", "tv", "最新"),
    lane("本周口碑榜", "", "本周口碑榜"),
    lane("热门趋势", "", "热门"),
];

const FEATURED_LANES: [LaneSpec; 9] = [
    lane("豆瓣热映", "", "热门"),
    lane("热门电视", "tv", "热门"),
    lane("国产剧", "tv", "国产剧"),
    lane("综艺", "tv", "综艺"),
    lane("美剧", "tv", "美剧"),
    lane("日剧", "tv", "日剧"),
    lane("韩剧", "tv", "韩剧"),
    lane("日本动画", "tv", "日本动画"),
    lane("纪录片", "tv", "纪录片"),
];

/// Named multi-lane data sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneSet {
    Movies,
    Tv,
    Latest,
    Featured,
}

impl LaneSet {
    pub const ALL: [LaneSet; 4] = [Self::Movies, Self::Tv, Self::Latest, Self::Featured];

    pub fn lanes(&self) -> &'static [LaneSpec] {
        match self {
            Self::Movies => &MOVIE_LANES,
            Self::Tv => &TV_LANES,
            Self::Latest => &LATEST_LANES,
            Self::Featured => &FEATURED_LANES,
        }
    }

    pub(crate) fn cache_key(&self) -> &'static str {
        match self {
            Self::Movies => "douban:movies:all",
            Self::Tv => "douban:tv:all",
            Self::Latest => "douban:latest:all",
            Self::Featured => "douban:new:all",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Tv => "tv",
            Self::Latest => "latest",
            Self::Featured => "featured",
        }
    }
}

/// (type, tag) behind a paginated category name
pub fn category_source(category: &str) -> Option<(&'static str, &'static str)> {
    let source = match category {
        "in_theaters" => ("", "热门"),
        "hot_movies" => ("movie", "热门"),
        "hot_tv" => ("tv", "热门"),
        "us_tv" => ("tv", "美剧"),
        "jp_tv" => ("tv", "日剧"),
        "kr_tv" => ("tv", "韩剧"),
        "anime" => ("tv", "日本动画"),
        "documentary" => ("tv", "纪录片"),
        "variety" => ("tv", "综艺"),
        "chinese_tv" => ("tv", "国产剧"),
        _ => return None,
    };
    Some(source)
}

fn tv_region_tag(region: &str) -> Option<&'static str> {
    match region {
        "大陆" => Some("国产"),
        "香港" => Some("港剧"),
        "台湾" => Some("台剧"),
        "美国" => Some("美剧"),
        "韩国" => Some("韩剧"),
        "日本" => Some("日剧"),
        "英国" => Some("英剧"),
        _ => None,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Listing type used for a filtered search: `tv` or `movie`
pub fn search_kind(filters: &ListingFilters) -> &'static str {
    match non_empty(&filters.kind) {
        Some("tv") => "tv",
        _ => "movie",
    }
}

/// Tag for a filtered search: genre, then region, then year, then sort
pub fn filter_tag(filters: &ListingFilters) -> String {
    if let Some(genre) = non_empty(&filters.genre) {
        return genre.to_string();
    }

    if let Some(region) = non_empty(&filters.region) {
        if search_kind(filters) == "tv" {
            if let Some(alias) = tv_region_tag(region) {
                return alias.to_string();
            }
        }
        return region.to_string();
    }

    if let Some(year) = non_empty(&filters.year) {
        return year.to_string();
    }

    match filters.sort.as_str() {
        "rank" => "高分".to_string(),
        "time" => "最新".to_string(),
        _ => HOT_TAG.to_string(),
    }
}

/// Display name of a filtered lane, e.g. `2024 · 美国 · 动作 · 电影`
pub fn filter_display_name(filters: &ListingFilters) -> String {
    let mut parts: Vec<&str> = [&filters.year, &filters.region, &filters.genre]
        .into_iter()
        .filter_map(non_empty)
        .collect();

    match non_empty(&filters.kind) {
        Some("movie") => parts.push("电影"),
        Some("tv") => parts.push("电视剧"),
        _ => {}
    }

    if parts.is_empty() {
        HOT_TAG.to_string()
    } else {
        parts.join(" · ")
    }
}

/// Query term for looking a title up in suggestions
///
/// Drops invisible formatting characters and parenthesised years (ASCII or
/// full-width parentheses), then keeps the first word.
pub fn search_term(title: &str) -> String {
    let visible: Vec<char> = title.chars().filter(|c| !is_invisible(*c)).collect();

    let mut kept = String::with_capacity(visible.len());
    let mut i = 0;
    while i < visible.len() {
        if is_year_group(&visible[i..]) {
            i += 6;
            kept.push(' ');
            continue;
        }
        kept.push(visible[i]);
        i += 1;
    }

    kept.split_whitespace().next().unwrap_or_default().to_string()
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{FEFF}')
}

fn is_year_group(chars: &[char]) -> bool {
    chars.len() >= 6
        && matches!(chars[0], '(' | '（')
        && chars[1..5].iter().all(char::is_ascii_digit)
        && matches!(chars[5], ')' | '）')
}
