/*! Contains all the information about satellites and the products read from them. */

use crate::{BolideError, BolideResult};
use std::str::FromStr;
use strum::{EnumIter, IntoEnumIterator};

/** The GOES satellites this library works with. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(EnumIter, strum::Display, strum::IntoStaticStr)]
pub enum Satellite {
    /// GOES-16 (formerly GOES-R), or commonly known as GOES East
    G16,
    /// GOES-17 (formerly GOES-S), or commonly known as GOES West
    G17,
}

impl Satellite {
    /// Get a string representing the name of the satellite.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// The bare number of the satellite as used in object keys and reference grid file names.
    pub fn id(&self) -> &'static str {
        use Satellite::*;

        match self {
            G16 => "16",
            G17 => "17",
        }
    }

    /// The name of the NOAA open data bucket holding the archive for this satellite.
    pub fn bucket(&self) -> String {
        format!("noaa-goes{}", self.id())
    }

    /// A known good full disk image used to build reference grids.
    ///
    /// Any product works as long as it comes from the right satellite, since all full disk
    /// products from a satellite share the same fixed grid.
    pub fn calibration_key(&self) -> &'static str {
        use Satellite::*;

        match self {
            G16 => "ABI-L2-ACMF/2022/001/00/OR_ABI-L2-ACMF-M6_G16_s20220010000205_e20220010009513_c20220010011165.nc",
            G17 => "ABI-L2-ACMF/2022/001/00/OR_ABI-L2-ACMF-M6_G17_s20220010000320_e20220010009386_c20220010010501.nc",
        }
    }

    /// Parse a satellite from its bare number ("16") or its name ("G16", "GOES-16").
    pub fn from_id(id: &str) -> BolideResult<Satellite> {
        let trimmed = id.trim();
        let number = trimmed
            .rsplit(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap_or(trimmed);

        Satellite::iter()
            .find(|sat| sat.id() == number)
            .ok_or_else(|| BolideError::UnsupportedSatellite(id.to_owned()))
    }

    /// Parse the satellite from a label of an event source, e.g. "GLM-16".
    ///
    /// The satellite number is the suffix after the last hyphen.
    pub fn from_source_label(label: &str) -> BolideResult<Satellite> {
        let suffix = label.trim().rsplit('-').next().unwrap_or("");
        Satellite::iter()
            .find(|sat| sat.id() == suffix)
            .ok_or_else(|| BolideError::UnsupportedSatellite(label.trim().to_owned()))
    }
}

impl FromStr for Satellite {
    type Err = BolideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Satellite::from_id(s)
    }
}

/** The full disk ABI products this library can extract bounding boxes from. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display, strum::IntoStaticStr)]
pub enum Product {
    /// The binary Clear Sky Mask, 0 is clear and 1 is cloudy.
    ///
    /// See <https://www.goes-r.gov/products/baseline-clear-sky-mask.html>
    #[strum(serialize = "CSM")]
    ClearSkyMask,
    /// Cloud and Moisture Imagery, the red visible band (C02).
    #[strum(serialize = "CMI")]
    CloudMoistureImagery,
}

impl Product {
    /// Short tag used for this product in output file names.
    pub fn tag(&self) -> &'static str {
        self.into()
    }

    /// The imagery code in the NOAA Big Data file naming scheme.
    pub fn imagery(&self) -> &'static str {
        use Product::*;

        match self {
            ClearSkyMask => "ACMF",
            CloudMoistureImagery => "CMIPF",
        }
    }

    /// The band suffix that follows the scan mode in file names, empty for single band products.
    pub fn band_suffix(&self) -> &'static str {
        use Product::*;

        match self {
            ClearSkyMask => "",
            CloudMoistureImagery => "C02",
        }
    }

    /// Name of the data variable in the netCDF file.
    pub fn data_variable(&self) -> &'static str {
        use Product::*;

        match self {
            ClearSkyMask => "BCM",
            CloudMoistureImagery => "CMI",
        }
    }

    /// The top level directory in the bucket for this product.
    pub fn prefix_base(&self) -> String {
        format!("ABI-L2-{}", self.imagery())
    }
}

impl FromStr for Product {
    type Err = BolideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Product::iter()
            .find(|p| p.tag().eq_ignore_ascii_case(s) || p.imagery().eq_ignore_ascii_case(s))
            .ok_or_else(|| BolideError::UnsupportedProduct(s.to_owned()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_satellite_parsing() {
        assert_eq!(Satellite::from_id("16").unwrap(), Satellite::G16);
        assert_eq!(Satellite::from_id("G17").unwrap(), Satellite::G17);
        assert_eq!(Satellite::from_id("GOES-16").unwrap(), Satellite::G16);
        assert_eq!("17".parse::<Satellite>().unwrap(), Satellite::G17);

        assert!(matches!(
            Satellite::from_id("18"),
            Err(BolideError::UnsupportedSatellite(_))
        ));
        assert!(Satellite::from_id("").is_err());
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(Satellite::from_source_label("GLM-16").unwrap(), Satellite::G16);
        assert_eq!(Satellite::from_source_label(" GLM-17").unwrap(), Satellite::G17);
        assert!(Satellite::from_source_label("GLM-18").is_err());
        assert!(Satellite::from_source_label("GLM").is_err());
    }

    #[test]
    fn test_buckets_and_calibration() {
        for sat in Satellite::iter() {
            assert_eq!(sat.bucket(), format!("noaa-goes{}", sat.id()));
            assert!(sat.calibration_key().contains(&format!("_G{}_", sat.id())));
            assert!(sat.calibration_key().starts_with("ABI-L2-ACMF/"));
        }
    }

    #[test]
    fn test_product_attributes() {
        let csm = Product::ClearSkyMask;
        assert_eq!(csm.prefix_base(), "ABI-L2-ACMF");
        assert_eq!(csm.band_suffix(), "");
        assert_eq!(csm.data_variable(), "BCM");

        let cmi = Product::CloudMoistureImagery;
        assert_eq!(cmi.prefix_base(), "ABI-L2-CMIPF");
        assert_eq!(cmi.band_suffix(), "C02");
        assert_eq!(cmi.data_variable(), "CMI");

        assert_eq!("csm".parse::<Product>().unwrap(), csm);
        assert_eq!("CMIPF".parse::<Product>().unwrap(), cmi);
        assert!(matches!(
            "RadF".parse::<Product>(),
            Err(BolideError::UnsupportedProduct(_))
        ));
    }
}
