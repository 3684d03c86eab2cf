//! The closed `CommandCode` catalog (spec.md §3, §6). Each variant maps
//! bijectively to its wire code.

/// A command identity drawn from the fixed catalog. `try_from_wire`/`to_wire`
/// form a bijection with the `u16` codes in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
  StartDaq,
  StopDaq,
  ResetDaq,

  InitSystem,
  MakeBiasCalibTable,
  MakeSimpleBiasSetTable,
  MakeSimpleChannelMap,
  MakeSimpleDiscSetTable,
  ReadTemperatureSensors,
  AcquireThresholdCalibration,
  AcquireThresholdCalibrationBaselineNoise,
  AcquireThresholdCalibrationDark,
  AcquireTdcCalibration,
  AcquireQdcCalibration,
  AcquireSipmData,

  ProcessThresholdCalibration,
  ProcessTdcCalibration,
  ProcessQdcCalibration,
  ConvertRawToRaw,
  ConvertRawToSingles,

  Ack,
  Callback,
  HeartBeat,
  DummyTest,
}

impl CommandCode {
  pub const fn to_wire(self) -> u16 {
    match self {
      CommandCode::StartDaq => 0x5000,
      CommandCode::StopDaq => 0x5001,
      CommandCode::ResetDaq => 0x5002,

      CommandCode::InitSystem => 0x5100,
      CommandCode::MakeBiasCalibTable => 0x5101,
      CommandCode::MakeSimpleBiasSetTable => 0x5102,
      CommandCode::MakeSimpleChannelMap => 0x5103,
      CommandCode::MakeSimpleDiscSetTable => 0x5104,
      CommandCode::ReadTemperatureSensors => 0x5105,
      CommandCode::AcquireThresholdCalibration => 0x5106,
      CommandCode::AcquireTdcCalibration => 0x5107,
      CommandCode::AcquireQdcCalibration => 0x5108,
      CommandCode::AcquireSipmData => 0x5109,
      CommandCode::AcquireThresholdCalibrationBaselineNoise => 0x5110,
      CommandCode::AcquireThresholdCalibrationDark => 0x5111,

      CommandCode::ProcessThresholdCalibration => 0x5200,
      CommandCode::ProcessTdcCalibration => 0x5201,
      CommandCode::ProcessQdcCalibration => 0x5202,
      CommandCode::ConvertRawToRaw => 0x5203,
      CommandCode::ConvertRawToSingles => 0x5204,

      CommandCode::Ack => 0x5FFF,
      CommandCode::Callback => 0x5FFE,
      CommandCode::HeartBeat => 0xFFFF,
      // No wire value is given in spec.md §6's table for DUMMY_TEST; 0x5FFD
      // is chosen as the unused slot directly below CALLBACK/ACK.
      CommandCode::DummyTest => 0x5FFD,
    }
  }

  pub const fn try_from_wire(code: u16) -> Option<Self> {
    Some(match code {
      0x5000 => CommandCode::StartDaq,
      0x5001 => CommandCode::StopDaq,
      0x5002 => CommandCode::ResetDaq,

      0x5100 => CommandCode::InitSystem,
      0x5101 => CommandCode::MakeBiasCalibTable,
      0x5102 => CommandCode::MakeSimpleBiasSetTable,
      0x5103 => CommandCode::MakeSimpleChannelMap,
      0x5104 => CommandCode::MakeSimpleDiscSetTable,
      0x5105 => CommandCode::ReadTemperatureSensors,
      0x5106 => CommandCode::AcquireThresholdCalibration,
      0x5107 => CommandCode::AcquireTdcCalibration,
      0x5108 => CommandCode::AcquireQdcCalibration,
      0x5109 => CommandCode::AcquireSipmData,
      0x5110 => CommandCode::AcquireThresholdCalibrationBaselineNoise,
      0x5111 => CommandCode::AcquireThresholdCalibrationDark,

      0x5200 => CommandCode::ProcessThresholdCalibration,
      0x5201 => CommandCode::ProcessTdcCalibration,
      0x5202 => CommandCode::ProcessQdcCalibration,
      0x5203 => CommandCode::ConvertRawToRaw,
      0x5204 => CommandCode::ConvertRawToSingles,

      0x5FFF => CommandCode::Ack,
      0x5FFE => CommandCode::Callback,
      0xFFFF => CommandCode::HeartBeat,
      0x5FFD => CommandCode::DummyTest,

      _ => return None,
    })
  }

  pub const fn name(self) -> &'static str {
    match self {
      CommandCode::StartDaq => "START_DAQ",
      CommandCode::StopDaq => "STOP_DAQ",
      CommandCode::ResetDaq => "RESET_DAQ",
      CommandCode::InitSystem => "INIT_SYSTEM",
      CommandCode::MakeBiasCalibTable => "MAKE_BIAS_CALIB_TABLE",
      CommandCode::MakeSimpleBiasSetTable => "MAKE_SIMPLE_BIAS_SET_TABLE",
      CommandCode::MakeSimpleChannelMap => "MAKE_SIMPLE_CHANNEL_MAP",
      CommandCode::MakeSimpleDiscSetTable => "MAKE_SIMPLE_DISC_SET_TABLE",
      CommandCode::ReadTemperatureSensors => "READ_TEMPERATURE_SENSORS",
      CommandCode::AcquireThresholdCalibration => "ACQUIRE_THRESHOLD_CALIBRATION",
      CommandCode::AcquireThresholdCalibrationBaselineNoise => {
        "ACQUIRE_THRESHOLD_CALIBRATION_BN"
      }
      CommandCode::AcquireThresholdCalibrationDark => "ACQUIRE_THRESHOLD_CALIBRATION_D",
      CommandCode::AcquireTdcCalibration => "ACQUIRE_TDC_CALIBRATION",
      CommandCode::AcquireQdcCalibration => "ACQUIRE_QDC_CALIBRATION",
      CommandCode::AcquireSipmData => "ACQUIRE_SIPM_DATA",
      CommandCode::ProcessThresholdCalibration => "PROCESS_THRESHOLD_CALIBRATION",
      CommandCode::ProcessTdcCalibration => "PROCESS_TDC_CALIBRATION",
      CommandCode::ProcessQdcCalibration => "PROCESS_QDC_CALIBRATION",
      CommandCode::ConvertRawToRaw => "CONVERT_RAW_TO_RAW",
      CommandCode::ConvertRawToSingles => "CONVERT_RAW_TO_SINGLES",
      CommandCode::Ack => "ACK",
      CommandCode::Callback => "CALLBACK",
      CommandCode::HeartBeat => "HEART_BEAT",
      CommandCode::DummyTest => "DUMMY_TEST",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ALL: &[CommandCode] = &[
    CommandCode::StartDaq,
    CommandCode::StopDaq,
    CommandCode::ResetDaq,
    CommandCode::InitSystem,
    CommandCode::MakeBiasCalibTable,
    CommandCode::MakeSimpleBiasSetTable,
    CommandCode::MakeSimpleChannelMap,
    CommandCode::MakeSimpleDiscSetTable,
    CommandCode::ReadTemperatureSensors,
    CommandCode::AcquireThresholdCalibration,
    CommandCode::AcquireThresholdCalibrationBaselineNoise,
    CommandCode::AcquireThresholdCalibrationDark,
    CommandCode::AcquireTdcCalibration,
    CommandCode::AcquireQdcCalibration,
    CommandCode::AcquireSipmData,
    CommandCode::ProcessThresholdCalibration,
    CommandCode::ProcessTdcCalibration,
    CommandCode::ProcessQdcCalibration,
    CommandCode::ConvertRawToRaw,
    CommandCode::ConvertRawToSingles,
    CommandCode::Ack,
    CommandCode::Callback,
    CommandCode::HeartBeat,
    CommandCode::DummyTest,
  ];

  #[test]
  fn bijective_round_trip() {
    for &code in ALL {
      let wire = code.to_wire();
      assert_eq!(CommandCode::try_from_wire(wire), Some(code));
    }
  }

  #[test]
  fn unknown_code_rejected() {
    assert_eq!(CommandCode::try_from_wire(0x0001), None);
  }

  #[test]
  fn codes_are_unique() {
    let mut wires: Vec<u16> = ALL.iter().map(|c| c.to_wire()).collect();
    wires.sort_unstable();
    let mut deduped = wires.clone();
    deduped.dedup();
    assert_eq!(wires.len(), deduped.len(), "duplicate wire codes");
  }
}
