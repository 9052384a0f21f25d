extern crate itertools;
extern crate qkernels;
extern crate rand;

use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use qkernels::{x32_depth_to_space_ukernels, X32DepthToSpaceUkernel};

const FAST_TEST: Option<&'static str> = option_env!("QKTEST_FAST_TEST");

const CANARY: u32 = 0xDEAD_BEAF;

/// Depth to space over a batch of images, dense NCHW input to dense NHWC
/// output, one kernel call per image.
struct DepthToSpaceTester {
    batch_size: usize,
    input_height: usize,
    input_width: usize,
    output_channels: usize,
    block_size: usize,
}

impl DepthToSpaceTester {
    fn input_channels(&self) -> usize {
        self.output_channels * self.block_size * self.block_size
    }

    fn output_height(&self) -> usize { self.input_height * self.block_size }
    fn output_width(&self) -> usize { self.input_width * self.block_size }

    fn test(&self, k: &X32DepthToSpaceUkernel, rng: &mut SmallRng) {
        let input_image = self.input_height * self.input_width * self.input_channels();
        let output_image = self.output_height() * self.output_width() * self.output_channels;
        let input: Vec<u32> = (0..self.batch_size * input_image).map(|_| rng.gen()).collect();
        let mut output = vec![CANARY; self.batch_size * output_image];

        let input_channel_stride = self.input_height * self.input_width;
        let input_height_stride = self.input_width;
        let output_height_stride = self.output_width() * self.output_channels;
        let output_width_stride = self.output_channels;

        for i in 0..self.batch_size {
            k.run(self.output_channels, self.input_height, self.input_width, self.block_size,
                  &input[i * input_image..(i + 1) * input_image],
                  &mut output[i * output_image..(i + 1) * output_image],
                  input_channel_stride * 4, input_height_stride * 4,
                  output_height_stride * 4, output_width_stride * 4);
        }

        let bs = self.block_size;
        for i in 0..self.batch_size {
            for iy in 0..self.input_height {
                for by in 0..bs {
                    for ix in 0..self.input_width {
                        for bx in 0..bs {
                            for oc in 0..self.output_channels {
                                let input_offset = i * input_image
                                    + (oc * bs * bs + by * bs + bx) * input_channel_stride
                                    + iy * input_height_stride + ix;
                                let output_offset = i * output_image
                                    + (iy * bs + by) * output_height_stride
                                    + (ix * bs + bx) * output_width_stride + oc;
                                assert_eq!(output[output_offset], input[input_offset],
                                           "{}: batch {}, input x {} / {}, input y {} / {}, \
                                            block x {} / {}, block y {} / {}, \
                                            output channel {} / {}",
                                           k.name, i, ix, self.input_width, iy,
                                           self.input_height, bx, bs, by, bs,
                                           oc, self.output_channels);
                            }
                        }
                    }
                }
            }
        }

        // dense layouts: a permutation of the input
        let mut sorted_input = input;
        let mut sorted_output = output;
        sorted_input.sort_unstable();
        sorted_output.sort_unstable();
        assert_eq!(sorted_input, sorted_output, "{}", k.name);
    }
}

#[test]
fn batch_shapes() {
    let mut rng = SmallRng::seed_from_u64(1);
    let sizes: &[usize] = if FAST_TEST.is_some() { &[1, 3] } else { &[1, 2, 3, 5, 7] };
    for k in x32_depth_to_space_ukernels() {
        for (((&ih, &iw), &oc), &bs) in sizes.iter()
            .cartesian_product(sizes)
            .cartesian_product(&[1, 3, 4])
            .cartesian_product(&[2, 3, 4, 5])
        {
            DepthToSpaceTester {
                batch_size: 1 + rng.gen_range(0..3),
                input_height: ih,
                input_width: iw,
                output_channels: oc,
                block_size: bs,
            }.test(k, &mut rng);
        }
    }
}

#[test]
fn padded_output_rows_are_untouched() {
    // output rows padded to a stride wider than the written row
    let (oc, ih, iw, bs) = (2, 3, 2, 2);
    let ow = iw * bs;
    let row_stride = ow * oc + 3;
    let input: Vec<u32> = (0..oc * bs * bs * ih * iw).map(|x| x as u32).collect();
    for k in x32_depth_to_space_ukernels() {
        let mut output = vec![CANARY; ih * bs * row_stride];
        k.run(oc, ih, iw, bs, &input, &mut output,
              ih * iw * 4, iw * 4, row_stride * 4, oc * 4);
        for row in output.chunks(row_stride) {
            assert!(row[..ow * oc].iter().all(|&x| x != CANARY), "{}", k.name);
            assert!(row[ow * oc..].iter().all(|&x| x == CANARY), "{}", k.name);
        }
    }
}

#[test]
fn idempotent() {
    let input: Vec<u32> = (0..2 * 9 * 4).collect();
    for k in x32_depth_to_space_ukernels() {
        let mut first = vec![0; input.len()];
        let mut second = vec![1; input.len()];
        k.run(2, 2, 2, 3, &input, &mut first, 16, 8, 2 * 6 * 4, 8);
        k.run(2, 2, 2, 3, &input, &mut second, 16, 8, 2 * 6 * 4, 8);
        assert_eq!(first, second, "{}", k.name);
    }
}

#[test]
fn raw_function_matches_run() {
    let input: Vec<u32> = (0..3 * 4 * 2 * 3).collect();
    for k in x32_depth_to_space_ukernels() {
        let mut expected = vec![0; input.len()];
        let mut output = vec![0; input.len()];
        k.run(3, 2, 3, 2, &input, &mut expected, 6 * 4, 3 * 4, 6 * 3 * 4, 3 * 4);
        unsafe {
            (k.function())(3, 2, 3, 2, input.as_ptr(), output.as_mut_ptr(),
                           6 * 4, 3 * 4, 6 * 3 * 4, 3 * 4);
        }
        assert_eq!(output, expected, "{:?}", k);
    }
}

#[test]
#[should_panic]
fn unaligned_stride_panics() {
    let k = x32_depth_to_space_ukernels().next().unwrap();
    k.run(1, 1, 1, 2, &[0; 4], &mut [0; 4], 4, 4, 8, 2);
}

#[test]
#[should_panic]
fn short_output_panics() {
    let k = x32_depth_to_space_ukernels().next().unwrap();
    k.run(1, 1, 1, 2, &[0; 4], &mut [0; 3], 4, 4, 8, 4);
}
