// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::work_unit::SeedRow;

/// 机构富化行中保存机构Logo的列名
pub const AGENCY_LOGO_FIELD: &str = "OG_Image";

/// 由 (站点代码, 来源URL, 标题) 派生稳定的房源ID
///
/// 同一房源在不同运行中总是得到相同的ID
pub fn stable_uid(site_code: &str, url: &str, title: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", site_code, url, title).as_bytes());
    let hex = hex::encode(digest);
    format!("{}-{}", site_code, &hex[..12])
}

/// 机构提取结果
#[derive(Debug, Clone, Default)]
pub struct AgencyExtraction {
    /// 原始种子行加上检测到的字段
    pub enriched: SeedRow,
    /// 机构档案导入行
    pub profile: AgencyProfile,
    /// 机构Logo（通常是 og:image）
    pub logo: String,
}

/// 房源提取结果
#[derive(Debug, Clone, Default)]
pub struct ListingExtraction {
    pub properties: Vec<PropertyRecord>,
    pub agents: Vec<AgentRecord>,
}

/// 机构档案导入行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgencyProfile {
    #[serde(rename = "Header")]
    pub header: String,
    #[serde(rename = "Agency Name")]
    pub agency_name: String,
    #[serde(rename = "Website Url")]
    pub website_url: String,
    #[serde(rename = "Slogan")]
    pub slogan: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Longitude")]
    pub longitude: String,
    #[serde(rename = "Latitude")]
    pub latitude: String,
    #[serde(rename = "Banner Image")]
    pub banner_image: String,
    #[serde(rename = "Short description")]
    pub short_description: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "WhatsApp Number")]
    pub whatsapp_number: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "City/Region (seed)")]
    pub city_region_seed: String,
}

/// 房源导入行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Images")]
    pub images: String,
    #[serde(rename = "Staff")]
    pub staff: String,
    #[serde(rename = "Unique ID")]
    pub unique_id: String,
    #[serde(rename = "Type")]
    pub listing_type: String,
    #[serde(rename = "Property Address")]
    pub address: String,
    #[serde(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "latitude")]
    pub latitude: String,
    #[serde(rename = "longitude")]
    pub longitude: String,
    #[serde(rename = "Number bedrooms")]
    pub bedrooms: String,
    #[serde(rename = "Number bathrooms")]
    pub bathrooms: String,
    #[serde(rename = "Number floors")]
    pub floors: String,
    #[serde(rename = "Square (m²)")]
    pub square_m2: String,
    #[serde(rename = "Year of Building")]
    pub year_built: String,
    #[serde(rename = "Property Lot Size")]
    pub lot_size: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Youtube Video Thumbnail")]
    pub youtube_thumbnail: String,
    #[serde(rename = "Youtube Video URL")]
    pub youtube_url: String,
    #[serde(rename = "Agency Name")]
    pub agency_name: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "ISO")]
    pub iso: String,
    #[serde(rename = "Listing URL")]
    pub listing_url: String,
    #[serde(rename = "Primary Image (resolved)")]
    pub primary_image: String,
    #[serde(rename = "Interior Features")]
    pub interior_features: String,
    #[serde(rename = "Exterior Features")]
    pub exterior_features: String,
    #[serde(rename = "Amenities")]
    pub amenities: String,
    #[serde(rename = "Services")]
    pub services: String,
    #[serde(rename = "Parking")]
    pub parking: String,
    #[serde(rename = "Furnished")]
    pub furnished: String,
    #[serde(rename = "Air Conditioning")]
    pub air_conditioning: String,
    #[serde(rename = "Heating")]
    pub heating: String,
    #[serde(rename = "View")]
    pub view: String,
    #[serde(rename = "Flooring")]
    pub flooring: String,
}

/// 经纪人导入行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// 由调度器在写入前填充
    #[serde(rename = "Agency Name")]
    pub agency_name: String,
    #[serde(rename = "Agent Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "WhatsApp")]
    pub whatsapp: String,
    #[serde(rename = "Photo")]
    pub photo: String,
    #[serde(rename = "Profile URL")]
    pub profile_url: String,
}

/// 人工审核队列行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    #[serde(rename = "Listing URL")]
    pub url: String,
    #[serde(rename = "Agency Name")]
    pub agency_name: String,
    #[serde(rename = "Reason")]
    pub reason: String,
    #[serde(rename = "Recorded At")]
    pub recorded_at: String,
}

/// 回退发现的替代URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    #[serde(rename = "Agency Name")]
    pub agency_name: String,
    #[serde(rename = "Source URL")]
    pub source_url: String,
    #[serde(rename = "Discovered URL")]
    pub discovered_url: String,
    #[serde(rename = "Strategy")]
    pub strategy: String,
}
