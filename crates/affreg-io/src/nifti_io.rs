use std::path::Path;

use affreg_core::image::{Image, VolumeGeometry};
use affreg_core::spatial::{Direction, Point, Spacing, Vector};
use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::SMatrix;
use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

/// A volume read into host memory.
///
/// `data` is indexed `[z, y, x]` in standard (row-major) layout, matching the tensor
/// layout of [`Image`].
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    pub data: Array3<f32>,
    pub geometry: VolumeGeometry,
}

impl NiftiVolume {
    /// Move the voxels onto a device.
    pub fn into_image<B: Backend>(self, device: &B::Device) -> Result<Image<B, 3>> {
        let shape = self.geometry.shape();
        let values: Vec<f32> = self.data.into_iter().collect();
        let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Image::from_geometry(tensor, &self.geometry).context("Invalid volume geometry")
    }
}

/// Index → world affine rows from sform, qform or pixdim, in that order of preference.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    if header.sform_code > 0 {
        return [header.srow_x, header.srow_y, header.srow_z].map(|row| row.map(f64::from));
    }

    let pixdim = header.pixdim.map(f64::from);
    if header.qform_code > 0 {
        let (b, c, d) = (
            header.quatern_b as f64,
            header.quatern_c as f64,
            header.quatern_d as f64,
        );
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let scale = [pixdim[1], pixdim[2], pixdim[3] * qfac];
        let offset = [header.quatern_x, header.quatern_y, header.quatern_z].map(f64::from);
        return std::array::from_fn(|row| {
            [
                r[row][0] * scale[0],
                r[row][1] * scale[1],
                r[row][2] * scale[2],
                offset[row],
            ]
        });
    }

    [
        [pixdim[1].abs().max(1e-6), 0.0, 0.0, 0.0],
        [0.0, pixdim[2].abs().max(1e-6), 0.0, 0.0],
        [0.0, 0.0, pixdim[3].abs().max(1e-6), 0.0],
    ]
}

/// Split an index → world affine into origin, spacing and direction cosines.
fn decompose_affine(affine: &[[f64; 4]; 3]) -> (Point<3>, Spacing<3>, Direction<3>) {
    let origin = Point::new([affine[0][3], affine[1][3], affine[2][3]]);
    let columns: [Vector<3>; 3] =
        std::array::from_fn(|c| Vector::new([affine[0][c], affine[1][c], affine[2][c]]));

    let spacing = Spacing::new(columns.map(|col| col.0.norm()));
    let axes = [
        nalgebra::Vector3::x(),
        nalgebra::Vector3::y(),
        nalgebra::Vector3::z(),
    ];
    let cosines: [nalgebra::Vector3<f64>; 3] = std::array::from_fn(|c| {
        if spacing[c] > 1e-9 {
            columns[c].0 / spacing[c]
        } else {
            axes[c]
        }
    });
    let direction = Direction(SMatrix::<f64, 3, 3>::from_columns(&cosines));
    (origin, spacing, direction)
}

/// Read a 3-D NIfTI file (`.nii` or `.nii.gz`) into host memory.
///
/// A 4-D file with a single volume along the fourth axis is accepted.
pub fn read_nifti_volume<P: AsRef<Path>>(path: P) -> Result<NiftiVolume> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;

    let (origin, spacing, direction) = decompose_affine(&header_affine(obj.header()));

    let mut array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    if array.ndim() == 4 && array.shape()[3] == 1 {
        array = array.index_axis_move(Axis(3), 0);
    }
    if array.ndim() != 3 {
        bail!(
            "Expected a 3D NIfTI volume in {}, found shape {:?}",
            path.display(),
            array.shape()
        );
    }
    let array = array.into_dimensionality::<Ix3>()?;
    let (nx, ny, nz) = array.dim();

    // NIfTI indexes (x, y, z); reorder to [z, y, x] with a standard layout.
    let data = array.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();
    let geometry = VolumeGeometry::new([nx, ny, nz], origin, spacing, direction);
    geometry
        .validate()
        .with_context(|| format!("Invalid geometry in {}", path.display()))?;

    Ok(NiftiVolume { data, geometry })
}

/// Read a NIfTI file straight into an [`Image`].
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    read_nifti_volume(path)?.into_image(device)
}

/// Write an image as float32 NIfTI, storing its geometry in the sform.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let geometry = image.geometry();
    let [nz, ny, nx] = image.shape();

    // [z, y, x] row-major → array indexed (x, y, z)
    let values = image
        .data()
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {:?}", e))?;
    let array = Array3::from_shape_vec((nz, ny, nx), values)?
        .permuted_axes([2, 1, 0])
        .as_standard_layout()
        .into_owned();

    let affine = geometry.index_to_world();
    let row = |r: usize| -> [f32; 4] { std::array::from_fn(|c| affine[(r, c)] as f32) };
    let mut pixdim = [1.0f32; 8];
    for axis in 0..3 {
        pixdim[axis + 1] = geometry.spacing[axis] as f32;
    }
    let header = NiftiHeader {
        sform_code: 2,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        pixdim,
        xyzt_units: 2,
        ..NiftiHeader::default()
    };

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_plain_array() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("plain.nii");

        // (x, y, z) = (3, 4, 5); value = 20 x + 5 y + z
        let data: Vec<f32> = (0..3 * 4 * 5).map(|v| v as f32).collect();
        let array = Array3::from_shape_vec((3, 4, 5), data)?;
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let image = read_nifti::<TestBackend, _>(&file_path, &device)?;
        assert_eq!(image.shape(), [5, 4, 3]);

        let values = image.data().clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 0.0);
        // [z=1, y=0, x=0]
        assert_eq!(values[12], 1.0);
        // [z=0, y=0, x=1]
        assert_eq!(values[1], 20.0);
        // [z=0, y=1, x=0]
        assert_eq!(values[3], 5.0);
        Ok(())
    }

    #[test]
    fn test_roundtrip_preserves_geometry() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("volume.nii.gz");
        let device = Default::default();

        let values: Vec<f32> = (0..4 * 5 * 6).map(|v| v as f32 * 0.5).collect();
        let tensor = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([4, 5, 6]);
        let mut direction = Direction::<3>::identity();
        direction[(0, 0)] = -1.0;
        direction[(1, 1)] = -1.0;
        let image = Image::new(
            tensor,
            Point::new([90.0, 126.0, -72.0]),
            Spacing::new([1.0, 1.25, 2.0]),
            direction,
        )?;

        write_nifti(&file_path, &image)?;
        let volume = read_nifti_volume(&file_path)?;
        let geom = volume.geometry;
        assert_eq!(geom.size, [6, 5, 4]);
        assert!(geom.origin.distance(image.origin()) < 1e-4);
        for axis in 0..3 {
            assert!((geom.spacing[axis] - image.spacing()[axis]).abs() < 1e-5);
        }
        assert!((geom.direction.0 - direction.0).abs().max() < 1e-6);

        let back = volume.into_image::<TestBackend>(&device)?;
        let read_values = back.data().clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(read_values, values);
        Ok(())
    }
}
