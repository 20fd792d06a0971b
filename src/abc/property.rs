//! Property handles of the high-level API.
//!
//! Input properties wrap the backend reader traits and add typed access
//! and sample selection by time. Output properties validate payloads and
//! collapse repeated samples into references to the previous index.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::write_context::WriteContext;
use crate::core::{
    ArraySample, ArraySampleKey, ArrayPropertyReader, ArrayPropertyWriter, CompoundPropertyReader,
    CompoundPropertyWriter, MetaData, PropertyHeader, PropertyReader, SampleSelector,
    ScalarPropertyReader, ScalarPropertyWriter, TimeSampling,
};
use crate::util::{AlembicPod, DataType, Dimensions, Error, PlainOldDataType, Result};

// ============================================================================
// Payload helpers
// ============================================================================

/// NUL-terminated concatenation of `strings`.
pub(crate) fn encode_strings<S: AsRef<str>>(strings: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for s in strings {
        let s = s.as_ref();
        if s.contains('\0') {
            return Err(Error::other(format!("string sample contains NUL: {s:?}")));
        }
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    Ok(out)
}

pub(crate) fn decode_strings(bytes: &[u8]) -> Result<Vec<String>> {
    let body = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    if body.is_empty() && bytes.is_empty() {
        return Ok(Vec::new());
    }
    body.split(|&b| b == 0)
        .map(|s| String::from_utf8(s.to_vec()).map_err(Error::from))
        .collect()
}

/// Check that `data` holds exactly `count` elements of `data_type`.
fn check_payload(name: &str, data_type: DataType, count: usize, data: &[u8]) -> Result<()> {
    match data_type.pod.fixed_size() {
        Some(size) => {
            let expected = size * data_type.extent as usize * count;
            if data.len() != expected {
                return Err(Error::mismatch(
                    format!("{expected} bytes for '{name}' ({count} x {data_type})"),
                    format!("{} bytes", data.len()),
                ));
            }
        }
        None if data_type.pod == PlainOldDataType::String => {
            let expected = data_type.extent as usize * count;
            let terminators = data.iter().filter(|&&b| b == 0).count();
            if terminators != expected || (expected > 0 && data.last() != Some(&0)) {
                return Err(Error::mismatch(
                    format!("{expected} NUL-terminated strings for '{name}'"),
                    format!("{terminators}"),
                ));
            }
        }
        None => {}
    }
    Ok(())
}

fn check_pod<T: AlembicPod>(data_type: DataType) -> Result<()> {
    if T::POD_TYPE == data_type.pod {
        Ok(())
    } else {
        Err(Error::mismatch(data_type.pod, T::POD_TYPE))
    }
}

fn check_string(data_type: DataType) -> Result<()> {
    if data_type.pod == PlainOldDataType::String {
        Ok(())
    } else {
        Err(Error::mismatch(PlainOldDataType::String, data_type.pod))
    }
}

// ============================================================================
// Input properties
// ============================================================================

/// Any input property.
#[derive(Clone)]
pub enum IProperty {
    Scalar(IScalarProperty),
    Array(IArrayProperty),
    Compound(ICompoundProperty),
}

impl IProperty {
    pub fn header(&self) -> &PropertyHeader {
        match self {
            Self::Scalar(p) => p.header(),
            Self::Array(p) => p.header(),
            Self::Compound(p) => p.header(),
        }
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }
}

impl From<PropertyReader> for IProperty {
    fn from(reader: PropertyReader) -> Self {
        match reader {
            PropertyReader::Scalar(r) => Self::Scalar(IScalarProperty::new(r)),
            PropertyReader::Array(r) => Self::Array(IArrayProperty::new(r)),
            PropertyReader::Compound(r) => Self::Compound(ICompoundProperty::new(r)),
        }
    }
}

#[derive(Clone)]
pub struct ICompoundProperty {
    reader: Arc<dyn CompoundPropertyReader>,
}

impl ICompoundProperty {
    pub fn new(reader: Arc<dyn CompoundPropertyReader>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<dyn CompoundPropertyReader> {
        &self.reader
    }

    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.header().meta_data
    }

    pub fn num_properties(&self) -> usize {
        self.reader.num_properties()
    }

    pub fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.reader.property_header(index)
    }

    pub fn property_header_by_name(&self, name: &str) -> Option<&PropertyHeader> {
        self.reader.property_header_by_name(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.reader.property_index(name).is_some()
    }

    pub fn property_names(&self) -> Vec<String> {
        (0..self.num_properties())
            .filter_map(|i| self.property_header(i).map(|h| h.name.clone()))
            .collect()
    }

    /// Property at `index`; `OutOfRange` past the end.
    pub fn property(&self, index: usize) -> Result<IProperty> {
        self.reader.property(index).map(IProperty::from)
    }

    pub fn try_property_by_name(&self, name: &str) -> Result<Option<IProperty>> {
        Ok(self.reader.property_by_name(name)?.map(IProperty::from))
    }

    /// `None` when absent. Backend failures are logged and reported as absent.
    pub fn property_by_name(&self, name: &str) -> Option<IProperty> {
        match self.try_property_by_name(name) {
            Ok(p) => p,
            Err(e) => {
                warn!(compound = self.name(), property = name, error = %e, "property lookup failed");
                None
            }
        }
    }

    pub fn scalar(&self, name: &str) -> Option<IScalarProperty> {
        match self.property_by_name(name)? {
            IProperty::Scalar(p) => Some(p),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<IArrayProperty> {
        match self.property_by_name(name)? {
            IProperty::Array(p) => Some(p),
            _ => None,
        }
    }

    pub fn compound(&self, name: &str) -> Option<ICompoundProperty> {
        match self.property_by_name(name)? {
            IProperty::Compound(p) => Some(p),
            _ => None,
        }
    }

    fn required(&self, name: &str, wanted: &str, data_type: DataType) -> Result<IProperty> {
        let prop = self
            .try_property_by_name(name)?
            .ok_or_else(|| Error::malformed(name, format!("required {wanted} property is missing")))?;
        let header = prop.header();
        if header.property_type.name() != wanted {
            return Err(Error::malformed(
                name,
                format!("expected {wanted} property, found {}", header.property_type),
            ));
        }
        if header.data_type != data_type {
            return Err(Error::malformed(
                name,
                format!("expected {data_type}, found {}", header.data_type),
            ));
        }
        Ok(prop)
    }

    /// Scalar property that must exist with exactly `data_type`.
    pub fn require_scalar(&self, name: &str, data_type: DataType) -> Result<IScalarProperty> {
        match self.required(name, "scalar", data_type)? {
            IProperty::Scalar(p) => Ok(p),
            _ => Err(Error::malformed(name, "expected scalar property")),
        }
    }

    /// Array property that must exist with exactly `data_type`.
    pub fn require_array(&self, name: &str, data_type: DataType) -> Result<IArrayProperty> {
        match self.required(name, "array", data_type)? {
            IProperty::Array(p) => Ok(p),
            _ => Err(Error::malformed(name, "expected array property")),
        }
    }
}

#[derive(Clone)]
pub struct IScalarProperty {
    reader: Arc<dyn ScalarPropertyReader>,
}

impl IScalarProperty {
    pub fn new(reader: Arc<dyn ScalarPropertyReader>) -> Self {
        Self { reader }
    }

    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn data_type(&self) -> DataType {
        self.header().data_type
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.header().meta_data
    }

    pub fn num_samples(&self) -> usize {
        self.reader.num_samples()
    }

    pub fn is_constant(&self) -> bool {
        self.reader.is_constant()
    }

    pub fn time_sampling(&self) -> Arc<TimeSampling> {
        self.reader.time_sampling()
    }

    fn index(&self, selector: impl Into<SampleSelector>) -> usize {
        selector
            .into()
            .resolve(&self.reader.time_sampling(), self.num_samples())
    }

    /// Raw payload of the selected sample.
    pub fn sample(&self, selector: impl Into<SampleSelector>) -> Result<Vec<u8>> {
        self.reader.sample(self.index(selector))
    }

    pub fn sample_key(&self, selector: impl Into<SampleSelector>) -> Result<ArraySampleKey> {
        self.reader.sample_key(self.index(selector))
    }

    /// The selected sample as `extent` values of `T`.
    pub fn get_typed<T: AlembicPod>(&self, selector: impl Into<SampleSelector>) -> Result<Vec<T>> {
        check_pod::<T>(self.data_type())?;
        let bytes = self.sample(selector)?;
        Ok(bytemuck::pod_collect_to_vec(bytes.as_slice()))
    }

    /// First value of the selected sample.
    pub fn get<T: AlembicPod>(&self, selector: impl Into<SampleSelector>) -> Result<T> {
        self.get_typed::<T>(selector)?
            .first()
            .copied()
            .ok_or_else(|| Error::malformed(self.name(), "empty sample"))
    }

    pub fn get_strings(&self, selector: impl Into<SampleSelector>) -> Result<Vec<String>> {
        check_string(self.data_type())?;
        decode_strings(&self.sample(selector)?)
    }

    pub fn get_string(&self, selector: impl Into<SampleSelector>) -> Result<String> {
        self.get_strings(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(self.name(), "empty string sample"))
    }
}

#[derive(Clone)]
pub struct IArrayProperty {
    reader: Arc<dyn ArrayPropertyReader>,
}

impl IArrayProperty {
    pub fn new(reader: Arc<dyn ArrayPropertyReader>) -> Self {
        Self { reader }
    }

    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn data_type(&self) -> DataType {
        self.header().data_type
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.header().meta_data
    }

    pub fn num_samples(&self) -> usize {
        self.reader.num_samples()
    }

    pub fn is_constant(&self) -> bool {
        self.reader.is_constant()
    }

    pub fn time_sampling(&self) -> Arc<TimeSampling> {
        self.reader.time_sampling()
    }

    fn index(&self, selector: impl Into<SampleSelector>) -> usize {
        selector
            .into()
            .resolve(&self.reader.time_sampling(), self.num_samples())
    }

    pub fn sample(&self, selector: impl Into<SampleSelector>) -> Result<ArraySample> {
        self.reader.sample(self.index(selector))
    }

    pub fn sample_key(&self, selector: impl Into<SampleSelector>) -> Result<ArraySampleKey> {
        self.reader.sample_key(self.index(selector))
    }

    pub fn dimensions(&self, selector: impl Into<SampleSelector>) -> Result<Dimensions> {
        self.reader.sample_dimensions(self.index(selector))
    }

    /// The selected sample as a flat vector of `T` (`points * extent` values).
    pub fn get_typed<T: AlembicPod>(&self, selector: impl Into<SampleSelector>) -> Result<Vec<T>> {
        check_pod::<T>(self.data_type())?;
        let sample = self.sample(selector)?;
        Ok(bytemuck::pod_collect_to_vec(sample.bytes()))
    }

    pub fn get_strings(&self, selector: impl Into<SampleSelector>) -> Result<Vec<String>> {
        check_string(self.data_type())?;
        decode_strings(self.sample(selector)?.bytes())
    }
}

impl std::fmt::Debug for IArrayProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IArrayProperty")
            .field("name", &self.name())
            .finish()
    }
}

// ============================================================================
// Output properties
// ============================================================================

#[derive(Clone)]
pub struct OCompoundProperty {
    writer: Arc<dyn CompoundPropertyWriter>,
    ctx: Arc<Mutex<WriteContext>>,
}

impl OCompoundProperty {
    pub(crate) fn new(writer: Arc<dyn CompoundPropertyWriter>, ctx: Arc<Mutex<WriteContext>>) -> Self {
        Self { writer, ctx }
    }

    pub fn header(&self) -> &PropertyHeader {
        self.writer.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn num_properties(&self) -> usize {
        self.writer.num_properties()
    }

    fn leaf_header(
        &self,
        header: PropertyHeader,
        time_sampling_index: u32,
        meta_data: MetaData,
    ) -> Result<PropertyHeader> {
        let registered = self.ctx.lock().time_samplings.len();
        if time_sampling_index as usize >= registered {
            return Err(Error::InvalidIndex(i64::from(time_sampling_index)));
        }
        let header = header
            .with_time_sampling(time_sampling_index)
            .with_meta_data(meta_data);
        header.validate()?;
        Ok(header)
    }

    pub fn create_scalar(
        &self,
        name: &str,
        data_type: DataType,
        meta_data: MetaData,
        time_sampling_index: u32,
    ) -> Result<OScalarProperty> {
        let header =
            self.leaf_header(PropertyHeader::scalar(name, data_type), time_sampling_index, meta_data)?;
        let writer = self.writer.create_scalar(header)?;
        Ok(OScalarProperty {
            writer,
            previous: None,
        })
    }

    pub fn create_array(
        &self,
        name: &str,
        data_type: DataType,
        meta_data: MetaData,
        time_sampling_index: u32,
    ) -> Result<OArrayProperty> {
        let header =
            self.leaf_header(PropertyHeader::array(name, data_type), time_sampling_index, meta_data)?;
        let writer = self.writer.create_array(header)?;
        Ok(OArrayProperty {
            writer,
            previous: None,
        })
    }

    pub fn create_compound(&self, name: &str, meta_data: MetaData) -> Result<OCompoundProperty> {
        let writer = self.writer.create_compound(name, meta_data)?;
        Ok(OCompoundProperty::new(writer, Arc::clone(&self.ctx)))
    }
}

pub struct OScalarProperty {
    writer: Arc<dyn ScalarPropertyWriter>,
    previous: Option<ArraySampleKey>,
}

impl OScalarProperty {
    pub fn header(&self) -> &PropertyHeader {
        self.writer.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn data_type(&self) -> DataType {
        self.header().data_type
    }

    pub fn num_samples(&self) -> usize {
        self.writer.num_samples()
    }

    /// Append one sample of `extent` values. A payload equal to the previous
    /// sample is recorded as a reference to it.
    pub fn set_sample(&mut self, data: &[u8]) -> Result<()> {
        let data_type = self.data_type();
        check_payload(self.name(), data_type, 1, data)?;
        let key = ArraySampleKey::from_data(data, data_type);
        if self.previous == Some(key) {
            trace!(property = self.name(), "repeated sample");
            return self.writer.set_from_previous();
        }
        self.writer.set_sample(key, data)?;
        self.previous = Some(key);
        Ok(())
    }

    /// Append a reference to the previous sample.
    pub fn set_from_previous(&mut self) -> Result<()> {
        self.writer.set_from_previous()
    }

    pub fn set_typed<T: AlembicPod>(&mut self, values: &[T]) -> Result<()> {
        check_pod::<T>(self.data_type())?;
        self.set_sample(bytemuck::cast_slice(values))
    }

    /// Single-value convenience for extent 1 properties.
    pub fn set<T: AlembicPod>(&mut self, value: T) -> Result<()> {
        self.set_typed(std::slice::from_ref(&value))
    }

    pub fn set_strings<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        check_string(self.data_type())?;
        self.set_sample(&encode_strings(values)?)
    }

    pub fn set_string(&mut self, value: &str) -> Result<()> {
        self.set_strings(&[value])
    }
}

pub struct OArrayProperty {
    writer: Arc<dyn ArrayPropertyWriter>,
    previous: Option<ArraySampleKey>,
}

impl OArrayProperty {
    pub fn header(&self) -> &PropertyHeader {
        self.writer.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn data_type(&self) -> DataType {
        self.header().data_type
    }

    pub fn num_samples(&self) -> usize {
        self.writer.num_samples()
    }

    /// Append one sample of `dims.num_points()` elements.
    pub fn set_sample(&mut self, data: &[u8], dims: &Dimensions) -> Result<()> {
        let data_type = self.data_type();
        check_payload(self.name(), data_type, dims.num_points(), data)?;
        let key = ArraySampleKey::for_array(data, data_type, dims);
        if self.previous == Some(key) {
            trace!(property = self.name(), "repeated sample");
            return self.writer.set_from_previous();
        }
        self.writer.set_sample(key, data, dims)?;
        self.previous = Some(key);
        Ok(())
    }

    pub fn set_from_previous(&mut self) -> Result<()> {
        self.writer.set_from_previous()
    }

    /// Append a rank-1 sample; `values.len()` must be a multiple of the extent.
    pub fn set_typed<T: AlembicPod>(&mut self, values: &[T]) -> Result<()> {
        check_pod::<T>(self.data_type())?;
        let extent = self.data_type().extent as usize;
        if extent == 0 || values.len() % extent != 0 {
            return Err(Error::mismatch(
                format!("a multiple of {extent} values"),
                values.len(),
            ));
        }
        let dims = Dimensions::d1(values.len() / extent);
        self.set_sample(bytemuck::cast_slice(values), &dims)
    }

    pub fn set_strings<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        check_string(self.data_type())?;
        let extent = self.data_type().extent as usize;
        if values.len() % extent.max(1) != 0 {
            return Err(Error::mismatch(
                format!("a multiple of {extent} strings"),
                values.len(),
            ));
        }
        let dims = Dimensions::d1(values.len() / extent.max(1));
        self.set_sample(&encode_strings(values)?, &dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_codec() {
        let bytes = encode_strings(&["a", "", "bc"]).unwrap();
        assert_eq!(bytes, b"a\0\0bc\0");
        assert_eq!(decode_strings(&bytes).unwrap(), vec!["a", "", "bc"]);
        assert!(decode_strings(b"").unwrap().is_empty());
        assert!(encode_strings(&["bad\0"]).is_err());
    }

    #[test]
    fn test_payload_checks() {
        assert!(check_payload("x", DataType::VEC3F, 1, &[0u8; 12]).is_ok());
        assert!(check_payload("x", DataType::VEC3F, 2, &[0u8; 12]).is_err());
        assert!(check_payload("s", DataType::STRING, 2, b"a\0b\0").is_ok());
        assert!(check_payload("s", DataType::STRING, 1, b"ab").is_err());
        assert!(check_payload("s", DataType::STRING, 0, b"").is_ok());
    }
}
