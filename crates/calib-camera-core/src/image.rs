#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i64, y: i64) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i64 || y >= src.height as i64 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear intensity sample; pixel centres sit on integer coordinates and
/// out-of-image taps read as black.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get_gray(src, x0, y0) as f64;
    let p10 = get_gray(src, x0 + 1, y0) as f64;
    let p01 = get_gray(src, x0, y0 + 1) as f64;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage {
            width: 2,
            height: 2,
            data: vec![0, 100, 100, 200],
        };
        let view = img.view();
        assert_eq!(sample_bilinear(&view, 0.0, 0.0), 0.0);
        assert_eq!(sample_bilinear(&view, 1.0, 1.0), 200.0);
        assert!((sample_bilinear(&view, 0.5, 0.5) - 100.0).abs() < 1e-12);
        assert!((sample_bilinear(&view, 0.5, 0.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn outside_taps_read_black() {
        let img = GrayImage {
            width: 1,
            height: 1,
            data: vec![255],
        };
        assert_eq!(sample_bilinear(&img.view(), -3.0, 0.0), 0.0);
        assert!((sample_bilinear(&img.view(), 0.5, 0.0) - 127.5).abs() < 1e-12);
    }
}
