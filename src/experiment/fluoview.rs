use std::path::Path;

use log::{debug, info};

use crate::dataset::{Grid, ImageDataset, MosaicCuboidDataset, OverlapUnit, StorageKind};
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::olympus::OlympusFormat;
use crate::io::xml::{NamespaceMap, XmlElement};
use crate::path::StoragePath;

use super::{read_project_document, schema_text, schema_value, MosaicExperiment, MosaicProjectReader};

const LEFT_TO_RIGHT: &str = "LeftToRight";
const TOP_TO_BOTTOM: &str = "TopToBottom";

/**
A tiled ("mosaic") project from older Olympus FluoView versions.

FluoView creates a `MATL_Mosaic.log` file for each tiled project. The file is XML
without any namespaces, describing the stage axis directions and then every mosaic
in detail: the number of tiles along each axis, the overlap, and the file name,
stage position and grid position of each tile. The tiles are OIF or OIB files.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct FluoViewMosaic;

impl FluoViewMosaic {
    fn validate(
        root: &XmlElement,
        ns: &NamespaceMap,
        experiment: &mut MosaicExperiment,
    ) -> Result<()> {
        info!("Validating FluoView Mosaic XML...");
        if !root.is("XYStage", ns) {
            return Err(MetadataError::Schema(format!(
                "Unexpected root element: {}",
                root.name
            )));
        }
        let xdir = schema_text(root, "XAxisDirection", ns)?;
        let ydir = schema_text(root, "YAxisDirection", ns)?;
        // NOTE: this is the HIGHEST INDEX used by FluoView, not the number of mosaics
        let mcount: i64 = schema_value(root, "NumberOfMosaics", ns)?;
        if xdir != LEFT_TO_RIGHT || ydir != TOP_TO_BOTTOM {
            return Err(MetadataError::Schema(format!(
                "Unsupported axis configuration: {xdir} / {ydir}"
            )));
        }
        experiment.set_supplement("xdir", xdir);
        experiment.set_supplement("ydir", ydir);
        experiment.set_supplement("mcount", mcount);
        info!("Finished validating XML.");
        Ok(())
    }

    /// Build the mosaic described by one `Mosaic` element. Mosaics scanned in an
    /// unsupported direction, or with a missing or broken tile, yield `None`. A tile
    /// that is not an OIF or OIB file fails the whole project.
    fn parse_mosaic(
        tree: &XmlElement,
        ns: &NamespaceMap,
        infile: &StoragePath,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<MosaicCuboidDataset>> {
        let source_name = infile.to_string();
        let index: i64 = tree
            .require_attribute("No", ns, &source_name)?
            .parse()
            .map_err(|e| MetadataError::malformed(&source_name, format!("invalid mosaic number: {e}")))?;
        let context = format!("Mosaic {index}");

        let xscan = tree.require_text("XScanDirection", ns, &source_name)?;
        let yscan = tree.require_text("YScanDirection", ns, &source_name)?;
        if xscan != LEFT_TO_RIGHT || yscan != TOP_TO_BOTTOM {
            diagnostics.warn(
                &context,
                format!("Unsupported scan direction {xscan} / {yscan}, SKIPPING!"),
            );
            return Ok(None);
        }

        let grid = Grid::new(
            tree.require_value("XImages", ns, &source_name)?,
            tree.require_value("YImages", ns, &source_name)?,
            1,
        );
        let index_ratio: f64 = tree.require_value("IndexRatio", ns, &source_name)?;
        // A mosaic has no project file of its own
        let mut mosaic = MosaicCuboidDataset::new(StorageKind::Tree, infile.clone(), grid)?;
        mosaic.set_overlap(100.0 - index_ratio, OverlapUnit::Percent, diagnostics);
        mosaic.descriptor_mut().set_supplement("index", index);
        let overlap_pct = mosaic.overlap(OverlapUnit::Percent)?;

        for image in tree.find_all("ImageInfo", ns) {
            let filename = image.require_text("Filename", ns, &source_name)?;
            match Self::parse_image_info(image, filename, ns, infile, overlap_pct, diagnostics) {
                Ok(tile) => mosaic.add_subvolume(tile),
                Err(err) if err.is_contained() => {
                    diagnostics.info(&context, format!("Broken/missing image data: {err}"));
                    diagnostics.warn(
                        &context,
                        format!(
                            "incomplete subvolumes, SKIPPING! First incomplete/missing subvolume: {filename}"
                        ),
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Some(mosaic))
    }

    /// Open the tile described by an `ImageInfo` element and place it in the grid
    fn parse_image_info(
        image: &XmlElement,
        filename: &str,
        ns: &NamespaceMap,
        infile: &StoragePath,
        overlap_pct: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<ImageDataset> {
        let source_name = infile.to_string();
        let format = match OlympusFormat::from_path(filename)? {
            format @ (OlympusFormat::Oif | OlympusFormat::Oib) => format,
            OlympusFormat::Oir => {
                return Err(MetadataError::NotSupported(format!(
                    "Unknown dataset type: {filename}"
                )))
            }
        };
        let storage = StoragePath::join_project_relative(&infile.directory, filename);
        let mut tile = ImageDataset::open_storage(format, storage, diagnostics)?;
        tile.set_stage_coordinates(
            Some(image.require_value("XPos", ns, &source_name)?),
            Some(image.require_value("YPos", ns, &source_name)?),
        );
        tile.set_tile_numbers(
            image.require_value("Xno", ns, &source_name)?,
            image.require_value("Yno", ns, &source_name)?,
            None,
        );
        tile.set_relative_position(overlap_pct, diagnostics)?;
        let number: i64 = image.require_value("No", ns, &source_name)?;
        tile.descriptor.set_supplement("index", number);
        debug!("Parsed tile {filename:?}, position: {:?}", tile.position.relative);
        Ok(tile)
    }
}

impl MosaicProjectReader for FluoViewMosaic {
    fn parse_with<P: AsRef<Path>>(
        path: P,
        diagnostics: &mut Diagnostics,
    ) -> Result<MosaicExperiment> {
        let infile = StoragePath::from_path(path);
        let root = read_project_document(&infile)?;
        let ns = NamespaceMap::new();
        let mut experiment = MosaicExperiment::new(infile);
        Self::validate(&root, &ns, &mut experiment)?;

        let trees: Vec<_> = root.find_all("Mosaic", &ns).collect();
        info!("Found {} potential mosaics in XML.", trees.len());
        for (position, tree) in trees.into_iter().enumerate() {
            match Self::parse_mosaic(tree, &ns, &experiment.infile, diagnostics) {
                Ok(Some(mosaic)) => experiment.add_dataset(mosaic),
                Ok(None) => {}
                Err(err) if err.is_contained() => {
                    diagnostics.warn(
                        &experiment.infile,
                        format!("Error parsing Mosaic element {position}, SKIPPING! {err}"),
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
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::io::olympus::{testing, OIB_KNOWN_VERSION};

    fn image_info(no: u32, name: &str, xno: u32, yno: u32) -> String {
        format!(
            "<ImageInfo><No>{no}</No><Filename>{name}</Filename><XPos>{}</XPos><YPos>{}</YPos><Xno>{xno}</Xno><Yno>{yno}</Yno></ImageInfo>",
            1000.0 + xno as f64 * 460.5,
            -2000.0 - yno as f64 * 460.5,
        )
    }

    fn mosaic(no: u32, scan: &str, images: &[String]) -> String {
        format!(
            "<Mosaic No=\"{no}\"><XScanDirection>{scan}</XScanDirection><YScanDirection>TopToBottom</YScanDirection><XImages>2</XImages><YImages>2</YImages><IndexRatio>90.0</IndexRatio>{}</Mosaic>",
            images.concat()
        )
    }

    fn project(xdir: &str, mosaics: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<XYStage><XAxisDirection>{xdir}</XAxisDirection><YAxisDirection>TopToBottom</YAxisDirection><NumberOfMosaics>{}</NumberOfMosaics>{}</XYStage>",
            mosaics.len(),
            mosaics.concat()
        )
    }

    /// Write the tiles of a 2x2 mosaic the way FluoView does, one directory per
    /// tile and the "_01" suffix on the file
    fn write_tiles(dir: &Path, prefix: &str, ext: &str) -> Vec<String> {
        (0..4u32)
            .map(|i| {
                let name = format!("{prefix}{:03}", i + 1);
                let tile_dir = dir.join(&name);
                fs::create_dir_all(&tile_dir).unwrap();
                let path = tile_dir.join(format!("{name}_01.{ext}"));
                if ext == "oif" {
                    testing::write_oif(&path, 512, 512);
                } else {
                    testing::write_oib(&path, OIB_KNOWN_VERSION, &testing::oif_text(512, 512, "Z", 3));
                }
                image_info(i + 1, &format!("{name}\\{name}.{ext}"), i % 2, i / 2)
            })
            .collect()
    }

    fn write_project(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("MATL_Mosaic.log");
        fs::write(&path, content).unwrap();
        path
    }

    #[test_log::test]
    fn test_oif_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_tiles(dir.path(), "Slide1sec", "oif");
        let path = write_project(dir.path(), &project(LEFT_TO_RIGHT, &[mosaic(0, LEFT_TO_RIGHT, &images)]));

        let (experiment, diag) = FluoViewMosaic::open(&path).unwrap();
        assert_eq!(experiment.len(), 1);
        assert!(diag.warnings().next().is_none());
        assert_eq!(
            experiment.supplement_value("xdir").and_then(|v| v.as_str()),
            Some("LeftToRight")
        );
        assert_eq!(
            experiment.supplement_value("mcount").and_then(|v| v.as_integer()),
            Some(1)
        );

        let mosaic = &experiment[0];
        assert_eq!(mosaic.grid, Grid::new(2, 2, 1));
        assert!((mosaic.overlap(OverlapUnit::Percent).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(mosaic.len(), 4);

        let tile = &mosaic[0];
        assert_eq!(tile.storage().directory_name, "Slide1sec001");
        assert_eq!(tile.storage().filename, "Slide1sec001_01.oif");
        assert_eq!(tile.format(), Some(OlympusFormat::Oif));
        assert_eq!(tile.position.stage, Some((Some(1000.0), Some(-2000.0))));
        assert_eq!(
            tile.descriptor.supplement_value("index").and_then(|v| v.as_integer()),
            Some(1)
        );

        let last = &mosaic[3];
        let (x, y) = last.position.relative.unwrap();
        assert!((x - 460.8).abs() < 1e-6 && (y - 460.8).abs() < 1e-6);
        assert_eq!(last.tile_numbers().map(|t| (t.x, t.y)), Some((1, 1)));
    }

    #[test_log::test]
    fn test_oib_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_tiles(dir.path(), "Slide2sec", "oib");
        let path = write_project(dir.path(), &project(LEFT_TO_RIGHT, &[mosaic(0, LEFT_TO_RIGHT, &images)]));

        let mut diag = Diagnostics::new();
        let experiment = FluoViewMosaic::parse_with(&path, &mut diag).unwrap();
        assert_eq!(experiment.len(), 1);
        let tile = &experiment[0][2];
        assert_eq!(tile.format(), Some(OlympusFormat::Oib));
        assert_eq!(tile.cached_dimensions().map(|d| d.z), Some(3));
    }

    #[test_log::test]
    fn test_broken_mosaics_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_tiles(dir.path(), "Good", "oif");
        let mut missing = write_tiles(dir.path(), "Miss", "oif");
        missing[2] = image_info(3, "Nowhere\\Nowhere.oif", 0, 1);
        let mosaics = [
            mosaic(0, LEFT_TO_RIGHT, &good),
            mosaic(1, LEFT_TO_RIGHT, &missing),
            mosaic(2, "RightToLeft", &good),
        ];
        let path = write_project(dir.path(), &project(LEFT_TO_RIGHT, &mosaics));

        let (experiment, diag) = FluoViewMosaic::open(&path).unwrap();
        assert_eq!(experiment.len(), 1);
        assert_eq!(
            experiment[0].descriptor().supplement_value("index").and_then(|v| v.as_integer()),
            Some(0)
        );
        let warnings: Vec<_> = diag.warnings().collect();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].context, "Mosaic 1");
        assert!(warnings[0].message.contains("Nowhere\\Nowhere.oif"));
        assert_eq!(warnings[1].context, "Mosaic 2");
    }

    #[test_log::test]
    fn test_unknown_tile_format_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_tiles(dir.path(), "Good", "oif");
        let mut unknown = good.clone();
        unknown[1] = image_info(2, "Good002\\Good002.tif", 1, 0);
        let mosaics = [mosaic(0, LEFT_TO_RIGHT, &good), mosaic(1, LEFT_TO_RIGHT, &unknown)];
        let path = write_project(dir.path(), &project(LEFT_TO_RIGHT, &mosaics));
        assert!(matches!(
            FluoViewMosaic::open(&path),
            Err(MetadataError::NotSupported(_))
        ));

        // OIR tiles only appear in FluoView 3000 projects
        unknown[1] = image_info(2, "Good002\\Good002.oir", 1, 0);
        let path = write_project(dir.path(), &project(LEFT_TO_RIGHT, &[mosaic(0, LEFT_TO_RIGHT, &unknown)]));
        assert!(matches!(
            FluoViewMosaic::open(&path),
            Err(MetadataError::NotSupported(_))
        ));
    }

    #[test]
    fn test_axis_direction_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        // the tiles do not exist, validation must fail before they are looked at
        let images = vec![image_info(1, "A\\A.oif", 0, 0)];
        let path = write_project(dir.path(), &project("RightToLeft", &[mosaic(0, LEFT_TO_RIGHT, &images)]));
        assert!(matches!(
            FluoViewMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));

        let path = write_project(
            dir.path(),
            "<XYStage><XAxisDirection>LeftToRight</XAxisDirection><YAxisDirection>BottomToTop</YAxisDirection><NumberOfMosaics>1</NumberOfMosaics></XYStage>",
        );
        assert!(matches!(
            FluoViewMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));

        let path = write_project(dir.path(), "<XYStage><XAxisDirection>LeftToRight</XAxisDirection></XYStage>");
        assert!(matches!(
            FluoViewMosaic::open(&path),
            Err(MetadataError::Schema(_))
        ));
    }
}
