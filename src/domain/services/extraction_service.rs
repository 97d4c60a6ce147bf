// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::domain::models::records::{
    stable_uid, AgencyExtraction, AgencyProfile, AgentRecord, ListingExtraction, PropertyRecord,
    AGENCY_LOGO_FIELD,
};
use crate::domain::models::work_unit::SeedRow;
use crate::utils::errors::ExtractionError;
use crate::utils::url_utils;

const SQFT_TO_M2: f64 = 0.092_903_04;
const MAX_CONTENT_CHARS: usize = 5000;
const MAX_IMAGES: usize = 35;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}").expect("valid email regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(?:\+|00)\d{1,3}[\s\-.]?)?(?:\(?\d{2,4}\)?[\s\-.]?)?\d{3,6}[\s\-.]?\d{3,6}")
        .expect("valid phone regex")
});

static SQFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d.,]+)\s*(sq\s*ft|sqft|ft2)").expect("valid area regex"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d.,]+").expect("valid number regex"));

static JSONLD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid json-ld selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid title selector"));
static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#)
        .expect("valid description selector")
});
static OG_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:image"]"#).expect("valid og:image selector")
});
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("valid body selector"));

const ORGANISATION_TYPES: [&str; 4] = [
    "organization",
    "localbusiness",
    "realestateagent",
    "realestatelisting",
];
const LISTING_TYPES: [&str; 6] = [
    "offer",
    "product",
    "residence",
    "apartment",
    "house",
    "realestatelisting",
];
const AGENT_TYPES: [&str; 2] = ["person", "realestateagent"];

/// 提取器特质
///
/// 对已抓取的页面内容做纯函数式提取，实现方不得发起网络请求
pub trait Extractor: Send + Sync {
    /// 提取机构信息
    ///
    /// # 参数
    ///
    /// * `html` - 机构网站首页内容
    /// * `seed` - 机构种子行
    fn extract_agency(&self, html: &str, seed: &SeedRow)
        -> Result<AgencyExtraction, ExtractionError>;

    /// 提取房源和经纪人
    ///
    /// # 参数
    ///
    /// * `html` - 房源页面内容
    /// * `seed` - 房源种子行
    /// * `agency_logo` - 所属机构Logo，用于缺图时兜底
    fn extract_listing(
        &self,
        html: &str,
        seed: &SeedRow,
        agency_logo: &str,
    ) -> Result<ListingExtraction, ExtractionError>;
}

/// 特征关键词分类表
///
/// 多语言关键词字典，可整体替换
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureTaxonomy {
    pub interior: Vec<String>,
    pub exterior: Vec<String>,
    pub amenities: Vec<String>,
    pub services: Vec<String>,
    pub parking: Vec<String>,
    pub furnished: Vec<String>,
    pub air_conditioning: Vec<String>,
    pub heating: Vec<String>,
    pub view: Vec<String>,
    pub flooring: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for FeatureTaxonomy {
    fn default() -> Self {
        Self {
            interior: words(&[
                "furnished", "semi-furnished", "unfurnished", "kitchen", "equipped kitchen",
                "open kitchen", "cocina equipada", "keuken", "balcony", "balcón", "balkon",
                "varanda", "ventiladores de techo", "ceiling fans", "walk-in closet",
                "armario vestidor", "inloopkast", "laundry", "lavandería", "lavanderia",
                "wasruimte", "office", "oficina", "kantoor", "fireplace", "chimenea",
                "open haard", "sauna", "air conditioning", "aire acondicionado",
                "ar-condicionado", "climatisation", "airco", "heating", "calefacción",
                "aquecimento", "chauffage", "vloerverwarming", "flooring", "hardwood", "tile",
                "ceramic", "porcelain", "marble", "laminate", "vinyl", "parquet", "mármol",
                "marmeren", "smart home", "domótica",
            ]),
            exterior: words(&[
                "garden", "jardín", "jardim", "tuin", "yard", "patio", "deck", "terraza",
                "terrace", "terras", "balcón", "balcony", "balkon", "rooftop", "solarium",
                "dakterras", "pergola", "pérgola", "pool", "piscina", "swimming pool",
                "jacuzzi", "hot tub", "bbq", "parrilla", "churrasqueira", "buitenkeuken",
                "garage", "garaje", "garagem", "carport", "cochera", "parking",
                "estacionamiento", "sea view", "ocean view", "vista al mar", "vista mar",
                "city view", "mountain view", "vista a la montaña", "lake view", "fence",
                "omheining", "perimeter", "resort cerrado", "gated community",
            ]),
            amenities: words(&[
                "elevator", "ascensor", "elevador", "lift", "security", "seguridad",
                "beveiliging", "24/7 security", "seguridad 24/7", "gated", "gated community",
                "condominium", "condominio", "condomínio", "hoa", "gym", "gimnasio", "fitness",
                "academia", "playground", "kids area", "park", "parque", "storage", "trastero",
                "depósito", "bodega", "berging", "generator", "backup power", "power backup",
                "generator set", "generador", "solar panels", "paneles solares",
                "panneaux solaires", "zonnepanelen", "cisterna", "water tank", "citerne",
                "waterreservoir", "rainwater",
            ]),
            services: words(&[
                "property management", "administración de propiedades", "beheer", "appraisal",
                "tasación", "valuation", "taxatie", "legal", "notary", "servicios legales",
                "juridisch", "mortgage", "financing", "hipoteca", "financiación", "hypotheek",
                "relocation", "expat", "concierge", "conserjería", "cleaning", "limpieza",
                "maintenance", "mantenimiento", "rental management", "gestión de alquileres",
                "key holding", "sleutelbeheer",
            ]),
            parking: words(&[
                "parking", "garage", "garaje", "garagem", "cochera", "estacionamiento",
                "carport",
            ]),
            furnished: words(&["furnished", "amueblado", "mobiliado", "gemeubileerd"]),
            air_conditioning: words(&[
                "air conditioning", "aire acondicionado", "ar-condicionado", "airco",
                "climatisation",
            ]),
            heating: words(&[
                "heating", "calefacción", "aquecimento", "chauffage", "vloerverwarming",
            ]),
            view: words(&[
                "sea view", "ocean view", "city view", "mountain view", "lake view",
                "vista al mar", "vista a la montaña",
            ]),
            flooring: words(&[
                "hardwood", "tile", "ceramic", "porcelain", "marble", "laminate", "vinyl",
                "parquet",
            ]),
        }
    }
}

/// 特征标注结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureTags {
    pub interior: String,
    pub exterior: String,
    pub amenities: String,
    pub services: String,
    pub parking: String,
    pub furnished: String,
    pub air_conditioning: String,
    pub heating: String,
    pub view: String,
    pub flooring: String,
}

impl FeatureTaxonomy {
    /// 从JSON文件加载分类表，缺失的类别使用默认关键词
    pub fn from_file(path: &Path) -> Result<Self, ExtractionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExtractionError::Other(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| ExtractionError::Malformed(format!("{}: {}", path.display(), e)))
    }

    /// 对文本做关键词标注
    pub fn tag(&self, text: &str) -> FeatureTags {
        let lower = text.to_lowercase();

        let pick = |keys: &[String]| -> String {
            keys.iter()
                .filter(|k| lower.contains(k.as_str()))
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let in_order = |keys: &[String]| -> String {
            keys.iter()
                .filter(|k| lower.contains(k.as_str()))
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let flag = |keys: &[String]| -> String {
            if keys.iter().any(|k| lower.contains(k.as_str())) {
                "Yes".to_string()
            } else {
                String::new()
            }
        };

        FeatureTags {
            interior: pick(&self.interior),
            exterior: pick(&self.exterior),
            amenities: pick(&self.amenities),
            services: pick(&self.services),
            parking: flag(&self.parking),
            furnished: flag(&self.furnished),
            air_conditioning: flag(&self.air_conditioning),
            heating: flag(&self.heating),
            view: in_order(&self.view),
            flooring: in_order(&self.flooring),
        }
    }
}

/// 页面元信息
#[derive(Debug, Clone, Default)]
struct PageMeta {
    title: String,
    description: String,
    og_image: String,
}

/// 解析后的页面
struct ParsedPage {
    jsonld: Vec<Value>,
    meta: PageMeta,
    text: String,
}

impl ParsedPage {
    fn parse(html: &str, base_url: &str) -> Self {
        let document = Html::parse_document(html);

        let mut jsonld = Vec::new();
        for script in document.select(&JSONLD_SELECTOR) {
            let raw: String = script.text().collect();
            let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
                continue;
            };
            flatten_jsonld(value, &mut jsonld);
        }

        let title = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let description = document
            .select(&DESCRIPTION_SELECTOR)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        let og_image = document
            .select(&OG_IMAGE_SELECTOR)
            .next()
            .and_then(|m| m.value().attr("content"))
            .and_then(|c| url_utils::absolute_url(base_url, c))
            .unwrap_or_default();

        let text = match document.select(&BODY_SELECTOR).next() {
            Some(body) => normalize_whitespace(body.text()),
            None => normalize_whitespace(document.root_element().text()),
        };

        Self {
            jsonld,
            meta: PageMeta {
                title,
                description,
                og_image,
            },
            text,
        }
    }
}

fn flatten_jsonld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_jsonld(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_jsonld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn normalize_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn types_of(node: &Value) -> Vec<String> {
    match node.get("@type") {
        Some(Value::String(t)) => vec![t.to_lowercase()],
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect(),
        _ => Vec::new(),
    }
}

fn has_type(node: &Value, wanted: &[&str]) -> bool {
    types_of(node).iter().any(|t| wanted.contains(&t.as_str()))
}

/// 数组取第一项
fn first(value: Option<&Value>) -> Option<&Value> {
    match value {
        Some(Value::Array(items)) => items.first(),
        other => other,
    }
}

/// 标量转字符串；`{"value": ...}` 形式取内部值
fn scalar(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Object(map)) => scalar(map.get("value")),
        _ => String::new(),
    }
}

fn field(node: &Value, key: &str) -> String {
    scalar(node.get(key))
}

fn address_line(node: Option<&Value>) -> String {
    let Some(addr) = first(node) else {
        return String::new();
    };
    if let Value::String(s) = addr {
        return s.trim().to_string();
    }
    let country = match addr.get("addressCountry") {
        Some(Value::Object(c)) => scalar(c.get("name")),
        other => scalar(other),
    };
    [
        field(addr, "streetAddress"),
        field(addr, "addressLocality"),
        field(addr, "addressRegion"),
        field(addr, "postalCode"),
        country,
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

fn geo_of(node: &Value) -> (String, String) {
    match first(node.get("geo")) {
        Some(geo) => (field(geo, "latitude"), field(geo, "longitude")),
        None => (String::new(), String::new()),
    }
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn images_of(node: &Value) -> Vec<String> {
    match node.get("image") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(image_url)
            .take(MAX_IMAGES)
            .collect(),
        Some(other) => image_url(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// 平方英尺转平方米，保留两位小数
pub fn sqft_to_m2(value: &str) -> String {
    let Some(m) = NUMBER_RE.find(value) else {
        return String::new();
    };
    match m.as_str().replace(',', "").parse::<f64>() {
        Ok(sqft) => {
            let m2 = (sqft * SQFT_TO_M2 * 100.0).round() / 100.0;
            m2.to_string()
        }
        Err(_) => String::new(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// 从房源节点提取的基础字段
#[derive(Debug, Default)]
struct ListingBase {
    record: PropertyRecord,
    amenities: Vec<String>,
}

fn listing_from_jsonld(node: &Value) -> ListingBase {
    let mut record = PropertyRecord {
        title: field(node, "name"),
        content: field(node, "description"),
        images: images_of(node).join(", "),
        address: address_line(node.get("address")),
        ..Default::default()
    };

    let (latitude, longitude) = geo_of(node);
    record.latitude = latitude;
    record.longitude = longitude;

    record.bedrooms = field(node, "numberOfBedrooms");
    if record.bedrooms.is_empty() {
        record.bedrooms = field(node, "numberOfRooms");
    }
    record.bathrooms = field(node, "numberOfBathroomsTotal");
    record.square_m2 = field(node, "floorSize");
    if record.square_m2.is_empty() {
        if let Some(caps) = SQFT_RE.captures(&record.content.to_lowercase()) {
            record.square_m2 = sqft_to_m2(&caps[1]);
        }
    }
    record.lot_size = field(node, "lotSize");
    record.year_built = field(node, "yearBuilt");

    if let Some(offer) = first(node.get("offers")) {
        record.price = field(offer, "price");
        record.currency = field(offer, "priceCurrency");
        if let Some(seller) = offer.get("seller") {
            record.staff = field(seller, "name");
        }
    }

    record.listing_type = if record.content.to_lowercase().contains("rent") {
        "Rent".to_string()
    } else {
        "Sale".to_string()
    };

    let amenities = match node.get("amenityFeature") {
        Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
    .into_iter()
    .map(|item| {
        let name = field(item, "name");
        if name.is_empty() {
            field(item, "value")
        } else {
            name
        }
    })
    .filter(|name| !name.is_empty())
    .collect();

    ListingBase { record, amenities }
}

/// 基于 JSON-LD 与页面元信息的默认提取器
pub struct JsonLdExtractor {
    taxonomy: FeatureTaxonomy,
}

impl Default for JsonLdExtractor {
    fn default() -> Self {
        Self::new(FeatureTaxonomy::default())
    }
}

impl JsonLdExtractor {
    pub fn new(taxonomy: FeatureTaxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &FeatureTaxonomy {
        &self.taxonomy
    }

    fn finish_property(
        &self,
        base: ListingBase,
        tags: FeatureTags,
        seed: &SeedRow,
        url: &str,
        listing_og: &str,
        agency_logo: &str,
    ) -> PropertyRecord {
        let mut record = base.record;
        let iso = seed.get("ISO");

        record.unique_id = stable_uid(iso, url, &record.title);
        if record.title.trim().is_empty() {
            record.title = "Property".to_string();
        } else {
            record.title = record.title.trim().to_string();
        }
        record.content = record.content.trim().to_string();
        record.status = if record.listing_type == "Sale" {
            "Selling".to_string()
        } else {
            "Renting".to_string()
        };

        record.primary_image = record
            .images
            .split(',')
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| (!listing_og.is_empty()).then(|| listing_og.to_string()))
            .unwrap_or_else(|| agency_logo.to_string());

        record.agency_name = seed.get("Agency Name").to_string();
        record.country = seed.get("Country").to_string();
        record.iso = iso.to_string();
        record.listing_url = url.to_string();

        let mut amenities = tags.amenities;
        if !base.amenities.is_empty() {
            let merged: BTreeSet<String> = amenities
                .split(", ")
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .chain(base.amenities)
                .collect();
            amenities = merged.into_iter().collect::<Vec<_>>().join(", ");
        }

        record.interior_features = tags.interior;
        record.exterior_features = tags.exterior;
        record.amenities = amenities;
        record.services = tags.services;
        record.parking = tags.parking;
        record.furnished = tags.furnished;
        record.air_conditioning = tags.air_conditioning;
        record.heating = tags.heating;
        record.view = tags.view;
        record.flooring = tags.flooring;
        record
    }

    fn agents(&self, jsonld: &[Value], agency_logo: &str) -> Vec<AgentRecord> {
        let mut seen = HashSet::new();
        let mut agents = Vec::new();

        for node in jsonld.iter().filter(|n| has_type(n, &AGENT_TYPES)) {
            let mut agent = AgentRecord {
                name: field(node, "name"),
                email: field(node, "email"),
                phone: field(node, "telephone"),
                photo: images_of(node).into_iter().next().unwrap_or_default(),
                profile_url: field(node, "url"),
                ..Default::default()
            };

            let key = (agent.name.clone(), agent.email.clone(), agent.phone.clone());
            if !seen.insert(key) {
                continue;
            }
            if agent.photo.is_empty() {
                agent.photo = agency_logo.to_string();
            }
            agents.push(agent);
        }
        agents
    }
}

impl Extractor for JsonLdExtractor {
    fn extract_agency(
        &self,
        html: &str,
        seed: &SeedRow,
    ) -> Result<AgencyExtraction, ExtractionError> {
        let url = seed.get("Website").trim();
        if url.is_empty() {
            return Err(ExtractionError::MissingField("Website".to_string()));
        }

        let page = ParsedPage::parse(html, url);

        let mut address = String::new();
        let mut latitude = String::new();
        let mut longitude = String::new();
        for node in page.jsonld.iter().filter(|n| has_type(n, &ORGANISATION_TYPES)) {
            address = address_line(node.get("address"));
            (latitude, longitude) = geo_of(node);
        }

        let email = match seed.get("Email") {
            "" => EMAIL_RE
                .find(&page.text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            seeded => seeded.to_string(),
        };
        let phone = match seed.get("Phone") {
            "" => PHONE_RE
                .find(&page.text)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
            seeded => seeded.to_string(),
        };

        let meta = page.meta;
        let slogan = if meta.title.is_empty() {
            seed.get("Description").to_string()
        } else {
            meta.title.clone()
        };
        let short_description = if meta.description.is_empty() {
            seed.get("Description").to_string()
        } else {
            meta.description.clone()
        };

        let mut enriched = seed.clone();
        enriched.set("Detected_Address", address.as_str());
        enriched.set("Detected_Latitude", latitude.as_str());
        enriched.set("Detected_Longitude", longitude.as_str());
        enriched.set("Meta_Title", slogan.as_str());
        enriched.set("Meta_Description", meta.description.as_str());
        enriched.set(AGENCY_LOGO_FIELD, meta.og_image.as_str());
        enriched.set("Email", email.as_str());
        enriched.set("Phone", phone.as_str());

        let profile = AgencyProfile {
            header: seed.get("Agency Name").to_string(),
            agency_name: seed.get("Agency Name").to_string(),
            website_url: url.to_string(),
            slogan,
            address,
            longitude,
            latitude,
            banner_image: meta.og_image.clone(),
            short_description,
            country: seed.get("Country").to_string(),
            state: seed.get("State").to_string(),
            city: seed.get("City").to_string(),
            phone,
            whatsapp_number: seed.get("WhatsApp").to_string(),
            email,
            city_region_seed: seed.get("City/Region").to_string(),
        };

        Ok(AgencyExtraction {
            enriched,
            profile,
            logo: meta.og_image,
        })
    }

    fn extract_listing(
        &self,
        html: &str,
        seed: &SeedRow,
        agency_logo: &str,
    ) -> Result<ListingExtraction, ExtractionError> {
        let url = seed.get("Listing URL").trim();
        if url.is_empty() {
            return Err(ExtractionError::MissingField("Listing URL".to_string()));
        }

        let page = ParsedPage::parse(html, url);
        let listing_nodes: Vec<&Value> = page
            .jsonld
            .iter()
            .filter(|n| has_type(n, &LISTING_TYPES))
            .collect();

        let mut properties = Vec::new();
        if listing_nodes.is_empty() {
            let mut base = ListingBase::default();
            base.record.title = match seed.get("Title") {
                "" => page.meta.title.clone(),
                title => title.to_string(),
            };
            base.record.content = truncate_chars(&page.text, MAX_CONTENT_CHARS);
            base.record.listing_type = "Sale".to_string();

            let tags = self
                .taxonomy
                .tag(&format!("{} {}", page.meta.description, page.text));
            properties.push(self.finish_property(
                base,
                tags,
                seed,
                url,
                &page.meta.og_image,
                agency_logo,
            ));
        } else {
            for node in listing_nodes {
                let base = listing_from_jsonld(node);
                let tags = self
                    .taxonomy
                    .tag(&format!("{} {}", base.record.content, page.text));
                properties.push(self.finish_property(
                    base,
                    tags,
                    seed,
                    url,
                    &page.meta.og_image,
                    agency_logo,
                ));
            }
        }

        Ok(ListingExtraction {
            properties,
            agents: self.agents(&page.jsonld, agency_logo),
        })
    }
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
