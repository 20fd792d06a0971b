//! Archive copy: reproduce one archive's content in a new output archive.
//!
//! The copy walks the backend tree rather than the resolved [`IObject`]
//! view, so instances stay instances. Repeated samples are collapsed again
//! on write, which preserves constant runs.
//!
//! [`IObject`]: super::IObject

use tracing::{debug, trace};

use super::archive::{IArchive, OArchive};
use super::object::OObject;
use super::property::OCompoundProperty;
use crate::core::{CompoundPropertyReader, ObjectReader, PropertyHeader, PropertyReader};
use crate::util::{Error, Result};

/// Copy time samplings, archive metadata, hierarchy and samples of `src`
/// into `dst`.
pub fn copy_archive(src: &IArchive, dst: &mut OArchive) -> Result<()> {
    let remap = (0..src.num_time_samplings())
        .map(|i| Ok(dst.add_time_sampling(src.time_sampling(i)?.as_ref().clone())))
        .collect::<Result<Vec<u32>>>()?;
    dst.archive_metadata_mut()
        .append_only_unique(src.archive_metadata());

    let top = src.reader().top()?;
    let mut stats = CopyStats::default();
    copy_object(top.as_ref(), &dst.top(), &remap, &mut stats)?;
    debug!(
        from = src.name(),
        to = dst.name(),
        objects = stats.objects,
        properties = stats.properties,
        samples = stats.samples,
        "copied archive"
    );
    Ok(())
}

#[derive(Default)]
struct CopyStats {
    objects: usize,
    properties: usize,
    samples: usize,
}

fn copy_object(
    src: &dyn ObjectReader,
    dst: &OObject,
    remap: &[u32],
    stats: &mut CopyStats,
) -> Result<()> {
    stats.objects += 1;
    copy_compound(src.properties()?.as_ref(), &dst.properties(), remap, stats)?;
    for i in 0..src.num_children() {
        let child = src.child(i)?;
        let header = child.header();
        let out = dst.create_child(&header.name, header.meta_data.clone())?;
        copy_object(child.as_ref(), &out, remap, stats)?;
    }
    Ok(())
}

fn time_sampling_index(remap: &[u32], header: &PropertyHeader) -> Result<u32> {
    remap
        .get(header.time_sampling_index as usize)
        .copied()
        .ok_or_else(|| Error::invalid(format!(
            "property '{}' uses unknown time sampling {}",
            header.name, header.time_sampling_index
        )))
}

fn copy_compound(
    src: &dyn CompoundPropertyReader,
    dst: &OCompoundProperty,
    remap: &[u32],
    stats: &mut CopyStats,
) -> Result<()> {
    for i in 0..src.num_properties() {
        stats.properties += 1;
        match src.property(i)? {
            PropertyReader::Compound(c) => {
                let header = c.header();
                let out = dst.create_compound(&header.name, header.meta_data.clone())?;
                copy_compound(c.as_ref(), &out, remap, stats)?;
            }
            PropertyReader::Scalar(s) => {
                let header = s.header();
                let mut out = dst.create_scalar(
                    &header.name,
                    header.data_type,
                    header.meta_data.clone(),
                    time_sampling_index(remap, header)?,
                )?;
                for index in 0..s.num_samples() {
                    out.set_sample(&s.sample(index)?)?;
                }
                stats.samples += s.num_samples();
                trace!(property = %header.name, samples = s.num_samples(), "copied scalar");
            }
            PropertyReader::Array(a) => {
                let header = a.header();
                let mut out = dst.create_array(
                    &header.name,
                    header.data_type,
                    header.meta_data.clone(),
                    time_sampling_index(remap, header)?,
                )?;
                for index in 0..a.num_samples() {
                    let sample = a.sample(index)?;
                    out.set_sample(sample.bytes(), &sample.dimensions)?;
                }
                stats.samples += a.num_samples();
                trace!(property = %header.name, samples = a.num_samples(), "copied array");
            }
        }
    }
    Ok(())
}
