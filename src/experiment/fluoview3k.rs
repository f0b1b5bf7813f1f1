use std::path::Path;

use log::{debug, info};

use crate::dataset::{Grid, ImageDataset, MosaicCuboidDataset, OverlapUnit, StorageKind};
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::olympus::OlympusFormat;
use crate::io::xml::{NamespaceMap, XmlElement};
use crate::path::StoragePath;

use super::{read_project_document, schema_text, schema_value, MosaicExperiment, MosaicProjectReader};

const NS_BASE: &str = "http://www.olympus.co.jp/hpf";

/// The only `matl:properties` version understood
pub const SCHEMA_VERSION: &str = "2.2";

/// The stage the tile geometry is known to be valid for
pub const KNOWN_STAGE: &str = "PRIOR,H101F";

const GROUP_TYPES: [&str; 2] = ["matl:DefineMatrixROI", "matl:MosaicROI"];
const REGION_TYPES: [&str; 2] = ["marker:rectangleRegion", "marker:polygonRegion"];
const REGION_SHAPES: [&str; 2] = ["Rectangle", "Polygon"];
const ROOT_ATTRIBUTES: [&str; 4] = ["version", "applicationVersion", "platformVersion", "id"];

fn namespaces() -> NamespaceMap {
    NamespaceMap::new()
        .with("matl", format!("{NS_BASE}/protocol/matl/model/matl"))
        .with("marker", format!("{NS_BASE}/model/marker"))
}

/**
A tiled project from Olympus FluoView 3000.

FluoView 3000 creates a `matl.omp2info` ("Multi Area Time Lapse") XML file for each
tiled project. Beyond a few project-wide settings like the tile overlap, every
mosaic (a "group" in FluoView terms) is only described by the file names of its OIR
tiles and their position in the tile grid. Everything else is read from the tiles.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct FluoView3kMosaic;

impl FluoView3kMosaic {
    /// Check the document is a FluoView 3000 project for a known stage, and return
    /// the project-wide tile overlap in percent
    fn validate(
        root: &XmlElement,
        ns: &NamespaceMap,
        experiment: &mut MosaicExperiment,
    ) -> Result<i64> {
        info!("Validating FluoView 3000 MATL XML ({})", experiment.infile);
        if !root.is("matl:properties", ns) {
            return Err(MetadataError::Schema(format!(
                "Invalid XML root tag: {}",
                root.name
            )));
        }
        debug!("Multi Area Time Lapse properties:");
        for key in ROOT_ATTRIBUTES {
            if let Some(value) = root.attribute(key, ns) {
                debug!(" - {key}: {value}");
                experiment.set_supplement(key, value);
            }
        }
        match root.attribute("version", ns) {
            Some(SCHEMA_VERSION) => {}
            version => {
                return Err(MetadataError::Schema(format!(
                    "Unknown properties version: {}",
                    version.unwrap_or("none")
                )))
            }
        }

        let stage_name = schema_text(root, "matl:stage/matl:name", ns)?;
        if stage_name != KNOWN_STAGE {
            return Err(MetadataError::Schema(format!(
                "Unknown stage found: {stage_name}"
            )));
        }
        debug!("Correct stage found ({stage_name}).");
        let overlap: i64 = schema_value(root, "matl:stage/matl:overlap", ns)?;
        debug!("Found stage overlap to be {overlap}.");
        experiment.set_supplement("overlap", overlap);
        info!("Finished validating XML.");
        Ok(overlap)
    }

    /// The groups describing tiled datasets, all other group kinds are irrelevant
    fn find_mosaic_groups<'a>(root: &'a XmlElement, ns: &NamespaceMap) -> Vec<&'a XmlElement> {
        debug!("Looking for Matrix ROI groups (tiling datasets).");
        let groups: Vec<_> = root
            .find_all("matl:group", ns)
            .filter(|group| {
                let kind = group.attribute("xsi:type", ns).unwrap_or_default();
                if GROUP_TYPES.contains(&kind) {
                    debug!(
                        "Group {} is a {kind}.",
                        group.attribute("objectId", ns).unwrap_or("?")
                    );
                    true
                } else {
                    false
                }
            })
            .collect();
        info!("Found {} Matrix ROIs (tiling datasets).", groups.len());
        groups
    }

    /// Build the mosaic for one group. Groups that are disabled or cover an
    /// unsupported region yield `None`.
    fn parse_group(
        group: &XmlElement,
        ns: &NamespaceMap,
        infile: &StoragePath,
        overlap: i64,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<MosaicCuboidDataset>> {
        let source_name = infile.to_string();
        let oid = group.require_attribute("objectId", ns, &source_name)?;
        let context = format!("ROI group {oid}");
        info!("Processing ROI group {oid}...");

        let region = group.require("marker:regionInfo", ns, &source_name)?;
        let region_type = region.attribute("xsi:type", ns).unwrap_or_default();
        if !REGION_TYPES.contains(&region_type) {
            diagnostics.warn(&context, format!("Unsupported region type {region_type:?}, skipping."));
            return Ok(None);
        }
        let shape = region.require_text("marker:shape", ns, &source_name)?;
        if !REGION_SHAPES.contains(&shape) {
            diagnostics.warn(&context, format!("Unsupported region shape {shape:?}, skipping."));
            return Ok(None);
        }
        debug!("Region shape: {shape}");

        if group.require_text("matl:enable", ns, &source_name)? != "true" {
            diagnostics.warn(&context, "Group is marked as \"disabled\", skipping.");
            return Ok(None);
        }
        let gid = group.require_text("matl:protocolGroupId", ns, &source_name)?;
        debug!(" - group ID: {gid:?}");

        let area_info = group.require("matl:areaInfo", ns, &source_name)?;
        let num_x: u32 = area_info.require_value("matl:numOfXAreas", ns, &source_name)?;
        let num_y: u32 = area_info.require_value("matl:numOfYAreas", ns, &source_name)?;
        debug!(" - number of areas X / Y: {num_x} / {num_y}");

        // A group has no project file of its own
        let mut mosaic =
            MosaicCuboidDataset::new(StorageKind::Tree, infile.clone(), Grid::new(num_x, num_y, 1))?;
        mosaic.set_overlap(overlap as f64, OverlapUnit::Percent, diagnostics);
        let descriptor = mosaic.descriptor_mut();
        descriptor.set_supplement("oid", oid);
        descriptor.set_supplement("gid", gid);
        // tile sizes in nanometers
        for (tag, key) in [("matl:areaWidth", "areaWidth"), ("matl:areaHeight", "areaHeight")] {
            if let Some(size) = area_info.find(tag, ns).and_then(|e| e.text().parse::<i64>().ok()) {
                descriptor.set_supplement(key, size);
            }
        }

        let areas: Vec<_> = group.find_all("matl:area", ns).collect();
        info!("Found {} area sections (i.e. tiles).", areas.len());
        for area in areas {
            match Self::parse_area(area, ns, infile, overlap, diagnostics) {
                Ok(tile) => mosaic.add_subvolume(tile),
                Err(err) => {
                    diagnostics.info(&context, format!("Group has broken image data: {err}"));
                    return Err(err);
                }
            }
        }
        Ok(Some(mosaic))
    }

    /// Open the OIR tile referenced by a `matl:area` element and place it in the grid
    fn parse_area(
        area: &XmlElement,
        ns: &NamespaceMap,
        infile: &StoragePath,
        overlap: i64,
        diagnostics: &mut Diagnostics,
    ) -> Result<ImageDataset> {
        let source_name = infile.to_string();
        let filename = area.require_text("matl:image", ns, &source_name)?;
        let grid_x: u32 = area.require_value("matl:xIndex", ns, &source_name)?;
        let grid_y: u32 = area.require_value("matl:yIndex", ns, &source_name)?;
        info!("File {filename:?} grid position: {grid_x} / {grid_y}");

        let storage = StoragePath::join_project_relative(&infile.directory, filename);
        let mut tile = ImageDataset::open_storage(OlympusFormat::Oir, storage, diagnostics)?;
        // the project file carries no stage coordinates
        tile.set_stage_coordinates(None, None);
        tile.set_tile_numbers(grid_x, grid_y, None);
        tile.set_relative_position(overlap as f64, diagnostics)?;
        debug!(
            "Parsed area {filename:?}, position: {:?}",
            tile.position.relative
        );
        Ok(tile)
    }
}

impl MosaicProjectReader for FluoView3kMosaic {
    fn parse_with<P: AsRef<Path>>(
        path: P,
        diagnostics: &mut Diagnostics,
    ) -> Result<MosaicExperiment> {
        let infile = StoragePath::from_path(path);
        let root = read_project_document(&infile)?;
        let ns = namespaces();
        let mut experiment = MosaicExperiment::new(infile);
        let overlap = Self::validate(&root, &ns, &mut experiment)?;

        for (index, group) in Self::find_mosaic_groups(&root, &ns).into_iter().enumerate() {
            match Self::parse_group(group, &ns, &experiment.infile, overlap, diagnostics) {
                Ok(Some(mut mosaic)) => {
                    mosaic.descriptor_mut().set_supplement("index", index);
                    experiment.add_dataset(mosaic);
                }
                Ok(None) => {
                    diagnostics.warn(
                        &experiment.infile,
                        format!("Mosaic from group {index} not usable, SKIPPING!"),
                    );
                }
                Err(err) if err.is_contained() => {
                    diagnostics.warn(
                        &experiment.infile,
                        format!("Error parsing mosaic from group {index}, SKIPPING! {err}"),
                    );
                }
                Err(err) => return Err(err),
            }
        }
        info!("Assembled {} mosaics from {}", experiment.len(), experiment.infile);
        Ok(experiment)
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::dataset::DatasetKind;
    use crate::io::olympus::testing;

    struct Group<'a> {
        oid: &'a str,
        kind: &'a str,
        region: &'a str,
        shape: &'a str,
        enable: &'a str,
        tiles: &'a [(&'a str, u32, u32)],
    }

    impl<'a> Group<'a> {
        fn matrix(oid: &'a str, tiles: &'a [(&'a str, u32, u32)]) -> Self {
            Self {
                oid,
                kind: "matl:DefineMatrixROI",
                region: "marker:rectangleRegion",
                shape: "Rectangle",
                enable: "true",
                tiles,
            }
        }

        fn to_xml(&self) -> String {
            let areas: String = self
                .tiles
                .iter()
                .map(|(name, x, y)| {
                    format!(
                        "<matl:area><matl:image>{name}</matl:image><matl:xIndex>{x}</matl:xIndex><matl:yIndex>{y}</matl:yIndex></matl:area>"
                    )
                })
                .collect();
            format!(
                r#"<matl:group xsi:type="{}" objectId="{}">
    <matl:enable>{}</matl:enable>
    <matl:protocolGroupId>{}</matl:protocolGroupId>
    <marker:regionInfo xsi:type="{}"><marker:shape>{}</marker:shape></marker:regionInfo>
    <matl:areaInfo><matl:numOfXAreas>2</matl:numOfXAreas><matl:numOfYAreas>1</matl:numOfYAreas><matl:areaWidth>636400</matl:areaWidth><matl:areaHeight>636400</matl:areaHeight></matl:areaInfo>
    {areas}
  </matl:group>"#,
                self.kind, self.oid, self.enable, self.oid, self.region, self.shape
            )
        }
    }

    fn project(version: &str, stage: &str, groups: &[Group]) -> String {
        let groups: String = groups.iter().map(Group::to_xml).collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<matl:properties xmlns:matl="http://www.olympus.co.jp/hpf/protocol/matl/model/matl"
    xmlns:marker="http://www.olympus.co.jp/hpf/model/marker"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    version="{version}" applicationVersion="2.3.1.163" platformVersion="2.3.1.163" id="p1">
  <matl:stage><matl:name>{stage}</matl:name><matl:overlap>10</matl:overlap></matl:stage>
  <matl:group xsi:type="matl:TimelapseGroup" objectId="ignored"/>
  {groups}
</matl:properties>"#
        )
    }

    fn write_project(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("matl.omp2info");
        fs::write(&path, content).unwrap();
        path
    }

    #[test_log::test]
    fn test_group_fault_isolation() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("G001")).unwrap();
        for name in ["G001/A01.oir", "G001/A02.oir", "C01.oir", "C02.oir"] {
            testing::write_oir(&dir.path().join(name), 512, 512, Some(4));
        }
        let groups = [
            Group::matrix("1", &[("G001\\A01.oir", 0, 0), ("G001\\A02.oir", 1, 0)]),
            Group::matrix("2", &[("B01.oir", 0, 0), ("B02.oir", 1, 0)]),
            Group::matrix("3", &[("C01.oir", 0, 0), ("C02.oir", 1, 0)]),
        ];
        let path = write_project(dir.path(), &project("2.2", "PRIOR,H101F", &groups));

        let (experiment, diag) = FluoView3kMosaic::open(&path).unwrap();
        assert_eq!(experiment.len(), 2);
        let indices: Vec<_> = experiment
            .iter()
            .map(|m| m.descriptor().supplement_value("index").and_then(|v| v.as_integer()))
            .collect();
        assert_eq!(indices, [Some(0), Some(2)]);
        let skipped: Vec<_> = diag.warnings().collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].message.contains("group 1"), "{}", skipped[0]);

        let mosaic = &experiment[0];
        assert_eq!(mosaic.descriptor().kind, DatasetKind::Mosaic);
        assert_eq!(mosaic.grid, Grid::new(2, 1, 1));
        assert_eq!(mosaic.overlap(OverlapUnit::Percent).unwrap(), 10.0);
        assert_eq!(
            mosaic.descriptor().supplement_value("oid").and_then(|v| v.as_str()),
            Some("1")
        );
        assert_eq!(
            mosaic.descriptor().supplement_value("areaWidth").and_then(|v| v.as_integer()),
            Some(636400)
        );
        let tile = &mosaic[1];
        assert_eq!(tile.storage().directory_name, "G001");
        assert_eq!(tile.position.stage, Some((None, None)));
        let (x, y) = tile.position.relative.unwrap();
        assert!((x - 460.8).abs() < 1e-9);
        assert_eq!(y, 0.0);
        assert_eq!(tile.cached_dimensions().map(|d| d.z), Some(4));

        assert_eq!(
            experiment.supplement_value("overlap").and_then(|v| v.as_integer()),
            Some(10)
        );
        assert_eq!(
            experiment.supplement_value("applicationVersion").and_then(|v| v.as_str()),
            Some("2.3.1.163")
        );
    }

    #[test_log::test]
    fn test_skipped_groups() {
        let dir = tempfile::tempdir().unwrap();
        testing::write_oir(&dir.path().join("A01.oir"), 256, 256, None);
        let tiles = [("A01.oir", 0, 0)];
        let mut disabled = Group::matrix("1", &tiles);
        disabled.enable = "false";
        let mut ellipse = Group::matrix("2", &tiles);
        ellipse.region = "marker:ellipseRegion";
        let mut mosaic_roi = Group::matrix("3", &tiles);
        mosaic_roi.kind = "matl:MosaicROI";
        let mut other = Group::matrix("4", &tiles);
        other.kind = "matl:PointROI";
        let mut circle = Group::matrix("5", &tiles);
        circle.shape = "Ellipse";
        let path = write_project(
            dir.path(),
            &project("2.2", "PRIOR,H101F", &[disabled, ellipse, mosaic_roi, other, circle]),
        );

        let mut diag = Diagnostics::new();
        let experiment = FluoView3kMosaic::parse_with(&path, &mut diag).unwrap();
        assert_eq!(experiment.len(), 1);
        assert_eq!(
            experiment[0].descriptor().supplement_value("oid").and_then(|v| v.as_str()),
            Some("3")
        );
        // reason and skip notice for each of the three rejected groups, nothing for
        // the group type that is not a mosaic at all
        assert_eq!(diag.warnings().count(), 6);
        assert!(diag.iter().all(|d| d.context != "ROI group 4"));
        assert!(diag
            .warnings()
            .any(|d| d.context == "ROI group 5" && d.message.contains("Ellipse")));
    }

    #[test]
    fn test_schema_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_project(dir.path(), &project("2.1", "PRIOR,H101F", &[]));
        assert!(matches!(
            FluoView3kMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));

        let path = write_project(dir.path(), &project("2.2", "MAERZHAEUSER", &[]));
        assert!(matches!(
            FluoView3kMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));

        let path = write_project(dir.path(), "<XYStage/>");
        assert!(matches!(
            FluoView3kMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));

        let (experiment, diag) =
            FluoView3kMosaic::open(write_project(dir.path(), &project("2.2", "PRIOR,H101F", &[])))
                .unwrap();
        assert!(experiment.is_empty());
        assert!(diag.is_empty());
    }
}
